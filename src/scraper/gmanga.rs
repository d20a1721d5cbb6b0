//! Gmanga adapter.
//!
//! The releases endpoint returns `data|iv|key`: base64 AES-256-CBC ciphertext, a base64 IV,
//! and a passphrase whose SHA-256 digest is the key.

use crate::model::{ChapterNumber, TitleCandidate};
use crate::scraper::{
    chapter_from_json, decode_json, sorted_unique, FetchRequest, HttpClient, MangaSite,
    ScraperError,
};
use aes::Aes256;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use scraper::Html;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

const BASE: &str = "https://gmanga.org";
const MEDIA_BASE: &str = "https://media.gmanga.org/uploads/releases";

type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub struct Gmanga;

#[derive(Debug, Deserialize)]
struct SearchGroup {
    #[serde(default)]
    data: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: Value,
    title: String,
    #[serde(default)]
    latest_chapter: Option<Value>,
    #[serde(default)]
    story_status: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct EncryptedPayload {
    data: String,
}

#[derive(Debug, Deserialize)]
struct ReleaseTables {
    rows: Vec<ReleaseTable>,
}

#[derive(Debug, Deserialize)]
struct ReleaseTable {
    #[serde(default)]
    rows: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReaderProps {
    reader_data_action: ReaderDataAction,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReaderDataAction {
    reader_data: ReaderData,
}

#[derive(Debug, Deserialize)]
struct ReaderData {
    release: Release,
}

#[derive(Debug, Deserialize)]
struct Release {
    storage_key: String,
    #[serde(default)]
    pages: Vec<String>,
    #[serde(default)]
    webp_pages: Option<Vec<String>>,
}

fn status_label(code: Option<u8>) -> &'static str {
    match code {
        Some(2) => "Ongoing",
        Some(3) => "Completed",
        _ => "Unknown",
    }
}

fn json_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn to_candidates(groups: Vec<SearchGroup>, limit: usize) -> Vec<TitleCandidate> {
    groups
        .into_iter()
        .next()
        .map(|g| g.data)
        .unwrap_or_default()
        .into_iter()
        .take(limit)
        .filter_map(|hit| {
            let id = json_scalar(&hit.id)?;
            let mut c = TitleCandidate::new(hit.title, id);
            c.latest = hit.latest_chapter.as_ref().and_then(json_scalar);
            c.status = Some(status_label(hit.story_status).to_string());
            Some(c)
        })
        .collect()
}

fn decrypt_payload(payload: &str) -> Result<String, ScraperError> {
    let decrypt_err = |reason: String| ScraperError::Decrypt { reason };
    let mut parts = payload.split('|');
    let (Some(data), Some(iv), Some(passphrase)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(decrypt_err("expected data|iv|key".to_string()));
    };
    let ciphertext = STANDARD
        .decode(data.trim())
        .map_err(|e| decrypt_err(format!("ciphertext: {}", e)))?;
    let iv = STANDARD
        .decode(iv.trim())
        .map_err(|e| decrypt_err(format!("iv: {}", e)))?;
    let key = Sha256::digest(passphrase.as_bytes());
    let plain = Aes256CbcDec::new_from_slices(&key, &iv)
        .map_err(|e| decrypt_err(e.to_string()))?
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|e| decrypt_err(e.to_string()))?;
    String::from_utf8(plain).map_err(|e| decrypt_err(e.to_string()))
}

/// Chapter numbers are the second column of the third table.
fn release_chapters(tables: &ReleaseTables) -> Result<Vec<ChapterNumber>, ScraperError> {
    let table = tables
        .rows
        .get(2)
        .ok_or_else(|| ScraperError::parse("releases", "missing chapter table"))?;
    Ok(sorted_unique(
        table
            .rows
            .iter()
            .filter_map(|row| row.get(1).and_then(chapter_from_json))
            .collect(),
    ))
}

fn reader_props(url: &str, html: &str) -> Result<Option<Release>, ScraperError> {
    let doc = Html::parse_document(html);
    let sel = cached_selector!(".js-react-on-rails-component")?;
    let Some(raw) = doc
        .select(sel)
        .next()
        .and_then(|e| e.value().attr("data-props"))
    else {
        return Ok(None);
    };
    let props: ReaderProps = decode_json(url, raw)?;
    Ok(Some(props.reader_data_action.reader_data.release))
}

fn release_images(release: &Release) -> Vec<String> {
    match release.webp_pages.as_ref().filter(|p| !p.is_empty()) {
        Some(webp) => webp
            .iter()
            .map(|img| format!("{}/{}/mq_webp/{}", MEDIA_BASE, release.storage_key, img))
            .collect(),
        None => release
            .pages
            .iter()
            .map(|img| format!("{}/{}/mq/{}", MEDIA_BASE, release.storage_key, img))
            .collect(),
    }
}

impl MangaSite for Gmanga {
    async fn search(
        &self,
        client: &HttpClient,
        query: &str,
        limit: usize,
    ) -> Result<Vec<TitleCandidate>, ScraperError> {
        let url = format!("{}/api/quick_search", BASE);
        let req = FetchRequest::post_json(&url, json!({ "query": query, "includes": ["Manga"] }))
            .referer(Some(BASE));
        let groups: Vec<SearchGroup> = client
            .json(&req)
            .await
            .map_err(|e| ScraperError::network(&url, e))?;
        let results = to_candidates(groups, limit);
        if results.is_empty() {
            return Err(ScraperError::NoResults {
                query: query.to_string(),
            });
        }
        Ok(results)
    }

    async fn chapter_list(
        &self,
        client: &HttpClient,
        candidate: &TitleCandidate,
    ) -> Result<Option<Vec<ChapterNumber>>, ScraperError> {
        let url = format!("{}/api/mangas/{}/releases", BASE, candidate.id);
        let payload: EncryptedPayload = client
            .json(&FetchRequest::get(&url).referer(Some(BASE)))
            .await
            .map_err(|e| ScraperError::network(&url, e))?;
        let plain = decrypt_payload(&payload.data)?;
        let tables: ReleaseTables = decode_json(&url, &plain)?;
        Ok(Some(release_chapters(&tables)?))
    }

    async fn chapter_pages(
        &self,
        client: &HttpClient,
        candidate: &TitleCandidate,
        chapter: ChapterNumber,
        _language: &str,
    ) -> Result<Vec<String>, ScraperError> {
        let url = format!("{}/mangas/{}/{}/", BASE, candidate.id, chapter);
        let html = client
            .text(&FetchRequest::get(&url).referer(Some(BASE)))
            .await
            .map_err(|e| ScraperError::network(&url, e))?;
        let images = reader_props(&url, &html)?
            .map(|release| release_images(&release))
            .unwrap_or_default();
        if images.is_empty() {
            return Err(ScraperError::ChapterNotFound {
                title: candidate.title.clone(),
                chapter: chapter.to_string(),
            });
        }
        Ok(images)
    }

    fn referer(&self, _candidate: &TitleCandidate) -> Option<String> {
        Some(BASE.to_string())
    }
}
