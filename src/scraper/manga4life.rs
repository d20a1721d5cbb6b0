//! Manga4Life adapter. The site embeds its data as JSON in `vm.*` script assignments.
//!
//! Chapter codes look like `100015`: one index digit, a four digit chapter number,
//! then one decimal digit (`100015` is chapter 1.5).

use crate::matcher;
use crate::model::{ChapterNumber, TitleCandidate};
use crate::scraper::{
    decode_json, script_capture, sorted_unique, FetchRequest, HttpClient, MangaSite, ScraperError,
};
use regex::Regex;
use serde::Deserialize;

const BASE: &str = "https://manga4life.com";

pub struct Manga4Life;

#[derive(Debug, Deserialize)]
struct DirectoryEntry {
    #[serde(rename = "i")]
    slug: String,
    #[serde(rename = "s")]
    title: String,
    #[serde(rename = "l", default)]
    latest: Option<String>,
    #[serde(rename = "ss", default)]
    status: Option<String>,
    #[serde(rename = "ls", default)]
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ChapterEntry {
    chapter: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CurrentChapter {
    chapter: String,
    #[serde(default)]
    directory: String,
    page: String,
}

fn decode_chapter_code(code: &str) -> Option<ChapterNumber> {
    if code.len() < 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let number: u32 = code[1..code.len() - 1].parse().ok()?;
    let decimal: u32 = code[code.len() - 1..].parse().ok()?;
    Some(ChapterNumber::from_tenths(number.checked_mul(10)?.checked_add(decimal)?))
}

/// Chapter as it appears in image file names: `0012` or `0012.5`.
fn chapter_file_stem(chapter: ChapterNumber) -> String {
    if chapter.is_whole() {
        format!("{:04}", chapter.integer_part())
    } else {
        format!("{:04}.{}", chapter.integer_part(), chapter.decimal_digit())
    }
}

fn directory_re() -> Result<&'static Regex, ScraperError> {
    cached_regex!(r"vm\.Directory = (.*);")
}

fn chapters_re() -> Result<&'static Regex, ScraperError> {
    cached_regex!(r"vm\.Chapters = (.*);")
}

fn cur_chapter_re() -> Result<&'static Regex, ScraperError> {
    cached_regex!(r"vm\.CurChapter = (.*);")
}

fn script_json<T: serde::de::DeserializeOwned>(
    url: &str,
    html: &str,
    re: &Regex,
    what: &'static str,
) -> Result<T, ScraperError> {
    let raw = script_capture(html, re)
        .ok_or_else(|| ScraperError::parse(what, format!("no {} assignment at {}", what, url)))?;
    decode_json(url, raw)
}

/// Titles containing the query first; if none contain it, the whole directory by similarity.
fn pick_candidates(directory: Vec<DirectoryEntry>, query: &str, limit: usize) -> Vec<TitleCandidate> {
    let needle = query.trim().to_lowercase();
    let (containing, rest): (Vec<_>, Vec<_>) = directory
        .into_iter()
        .partition(|e| e.title.to_lowercase().contains(&needle));
    let pool = if containing.is_empty() { rest } else { containing };
    matcher::rank_by_similarity(query, pool, |e| e.title.as_str())
        .into_iter()
        .take(limit)
        .map(|e| {
            let mut c = TitleCandidate::new(e.title, e.slug);
            c.latest = e.latest.map(|code| {
                decode_chapter_code(&code)
                    .map(|n| n.to_string())
                    .unwrap_or(code)
            });
            c.status = e.status;
            c.updated = e.updated;
            c
        })
        .collect()
}

fn page_urls(slug: &str, host: &str, current: &CurrentChapter) -> Result<Vec<String>, ScraperError> {
    let chapter = decode_chapter_code(&current.chapter).ok_or_else(|| {
        ScraperError::parse("chapter code", format!("unexpected code {:?}", current.chapter))
    })?;
    let pages: u32 = current.page.trim().parse().map_err(|_| {
        ScraperError::parse("page count", format!("unexpected value {:?}", current.page))
    })?;
    let directory = if current.directory.is_empty() {
        String::new()
    } else {
        format!("/{}", current.directory)
    };
    let stem = chapter_file_stem(chapter);
    Ok((1..=pages)
        .map(|p| format!("https://{}/manga/{}{}/{}-{:03}.png", host, slug, directory, stem, p))
        .collect())
}

impl MangaSite for Manga4Life {
    async fn search(
        &self,
        client: &HttpClient,
        query: &str,
        limit: usize,
    ) -> Result<Vec<TitleCandidate>, ScraperError> {
        let url = format!("{}/search/", BASE);
        let html = client
            .text(&FetchRequest::get(&url))
            .await
            .map_err(|e| ScraperError::network(&url, e))?;
        let directory: Vec<DirectoryEntry> =
            script_json(&url, &html, directory_re()?, "vm.Directory")?;
        let results = pick_candidates(directory, query, limit);
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
        let url = format!("{}/manga/{}", BASE, candidate.id);
        let html = client
            .text(&FetchRequest::get(&url))
            .await
            .map_err(|e| ScraperError::network(&url, e))?;
        let chapters: Vec<ChapterEntry> =
            script_json(&url, &html, chapters_re()?, "vm.Chapters")?;
        Ok(Some(sorted_unique(
            chapters
                .iter()
                .filter_map(|c| decode_chapter_code(&c.chapter))
                .collect(),
        )))
    }

    async fn chapter_pages(
        &self,
        client: &HttpClient,
        candidate: &TitleCandidate,
        chapter: ChapterNumber,
        _language: &str,
    ) -> Result<Vec<String>, ScraperError> {
        let url = format!(
            "{}/read-online/{}-chapter-{}-index-1.html",
            BASE, candidate.id, chapter
        );
        let html = client
            .text(&FetchRequest::get(&url).referer(Some(BASE)))
            .await
            .map_err(|e| ScraperError::network(&url, e))?;
        let current: CurrentChapter =
            match script_json(&url, &html, cur_chapter_re()?, "vm.CurChapter") {
                Ok(c) => c,
                Err(ScraperError::Parse { .. }) => {
                    return Err(ScraperError::ChapterNotFound {
                        title: candidate.title.clone(),
                        chapter: chapter.to_string(),
                    })
                }
                Err(e) => return Err(e),
            };
        let host_re = cached_regex!(r#"vm\.CurPathName = "(.*)";"#)?;
        let host = script_capture(&html, host_re)
            .ok_or_else(|| ScraperError::parse("vm.CurPathName", format!("missing at {}", url)))?;
        page_urls(&candidate.id, host, &current)
    }

    fn referer(&self, _candidate: &TitleCandidate) -> Option<String> {
        Some(BASE.to_string())
    }
}
