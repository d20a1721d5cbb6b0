//! MangaDex public REST API adapter.
//!
//! MangaDex cannot list chapter numbers cheaply, so [MangaSite::chapter_list]
//! returns `None` and each requested chapter is looked up individually.

use crate::model::{ChapterNumber, TitleCandidate};
use crate::scraper::{FetchRequest, HttpClient, MangaSite, ScraperError};
use serde::Deserialize;
use std::collections::HashMap;

const API_BASE: &str = "https://api.mangadex.org";

pub struct MangaDex;

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct MangaData {
    id: String,
    attributes: MangaAttributes,
}

#[derive(Debug, Deserialize)]
struct MangaAttributes {
    #[serde(default)]
    title: HashMap<String, String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(rename = "lastChapter", default)]
    last_chapter: Option<String>,
    #[serde(rename = "updatedAt", default)]
    updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChapterData {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AtHomeResponse {
    base_url: String,
    chapter: AtHomeChapter,
}

#[derive(Debug, Deserialize)]
struct AtHomeChapter {
    hash: String,
    data: Vec<String>,
}

/// English title if present, otherwise any title, otherwise the query itself.
fn display_title(attrs: &MangaAttributes, query: &str) -> String {
    attrs
        .title
        .get("en")
        .or_else(|| attrs.title.values().next())
        .cloned()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| query.to_string())
}

fn to_candidates(list: ListResponse<MangaData>, query: &str) -> Vec<TitleCandidate> {
    list.data
        .into_iter()
        .map(|m| {
            let mut c = TitleCandidate::new(display_title(&m.attributes, query), m.id);
            c.status = m.attributes.status;
            c.latest = m.attributes.last_chapter.filter(|s| !s.is_empty());
            c.updated = m.attributes.updated_at;
            c
        })
        .collect()
}

fn page_urls(at_home: &AtHomeResponse) -> Vec<String> {
    at_home
        .chapter
        .data
        .iter()
        .map(|page| format!("{}/data/{}/{}", at_home.base_url, at_home.chapter.hash, page))
        .collect()
}

impl MangaSite for MangaDex {
    async fn search(
        &self,
        client: &HttpClient,
        query: &str,
        limit: usize,
    ) -> Result<Vec<TitleCandidate>, ScraperError> {
        let url = format!("{}/manga", API_BASE);
        let req = FetchRequest::get(&url)
            .query("title", query)
            .query("limit", limit.max(1).to_string())
            .query("order[relevance]", "desc");
        let list: ListResponse<MangaData> = client
            .json(&req)
            .await
            .map_err(|e| ScraperError::network(&url, e))?;
        let results = to_candidates(list, query);
        if results.is_empty() {
            return Err(ScraperError::NoResults {
                query: query.to_string(),
            });
        }
        Ok(results)
    }

    async fn chapter_list(
        &self,
        _client: &HttpClient,
        _candidate: &TitleCandidate,
    ) -> Result<Option<Vec<ChapterNumber>>, ScraperError> {
        Ok(None)
    }

    async fn chapter_pages(
        &self,
        client: &HttpClient,
        candidate: &TitleCandidate,
        chapter: ChapterNumber,
        language: &str,
    ) -> Result<Vec<String>, ScraperError> {
        let url = format!("{}/chapter", API_BASE);
        let req = FetchRequest::get(&url)
            .query("manga", candidate.id.as_str())
            .query("chapter", chapter.to_string())
            .query("translatedLanguage[]", language)
            .query("limit", "1");
        let list: ListResponse<ChapterData> = client
            .json(&req)
            .await
            .map_err(|e| ScraperError::network(&url, e))?;
        let Some(found) = list.data.into_iter().next() else {
            return Err(ScraperError::ChapterNotFound {
                title: candidate.title.clone(),
                chapter: chapter.to_string(),
            });
        };

        let url = format!("{}/at-home/server/{}", API_BASE, found.id);
        let at_home: AtHomeResponse = client
            .json(&FetchRequest::get(&url))
            .await
            .map_err(|e| ScraperError::network(&url, e))?;
        Ok(page_urls(&at_home))
    }

    fn referer(&self, _candidate: &TitleCandidate) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::decode_json;

    #[test]
    fn search_response_to_candidates() -> Result<(), ScraperError> {
        let raw = r#"{"result":"ok","data":[
{"id":"a1c7c817-4e59-43b7-9365-09675a149a6f","type":"manga","attributes":{
  "title":{"en":"One Piece"},"status":"ongoing","lastChapter":"","updatedAt":"2024-01-01T00:00:00+00:00"}}
]}"#;
        let list: ListResponse<MangaData> = decode_json("test", raw)?;
        let got = to_candidates(list, "one piece");
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].title, "One Piece");
        assert_eq!(got[0].id, "a1c7c817-4e59-43b7-9365-09675a149a6f");
        assert_eq!(got[0].status.as_deref(), Some("ongoing"));
        assert_eq!(got[0].latest, None);
        Ok(())
    }

    #[test]
    fn title_falls_back_to_other_language_then_query() -> Result<(), ScraperError> {
        let raw = r#"{"data":[
{"id":"x","attributes":{"title":{"ja-ro":"Shingeki no Kyojin"}}},
{"id":"y","attributes":{"title":{}}}
]}"#;
        let list: ListResponse<MangaData> = decode_json("test", raw)?;
        let got = to_candidates(list, "attack on titan");
        assert_eq!(got[0].title, "Shingeki no Kyojin");
        assert_eq!(got[1].title, "attack on titan");
        Ok(())
    }

    #[test]
    fn at_home_builds_page_urls() -> Result<(), ScraperError> {
        let raw = r#"{"result":"ok","baseUrl":"https://uploads.mangadex.org","chapter":{
"hash":"3303dd03ac8d27452cce3f2a882e94b2","data":["1-f7a76de10d.png","2-adbd2d3b11.png"],"dataSaver":[]}}"#;
        let at_home: AtHomeResponse = decode_json("test", raw)?;
        assert_eq!(
            page_urls(&at_home),
            vec![
                "https://uploads.mangadex.org/data/3303dd03ac8d27452cce3f2a882e94b2/1-f7a76de10d.png"
                    .to_string(),
                "https://uploads.mangadex.org/data/3303dd03ac8d27452cce3f2a882e94b2/2-adbd2d3b11.png"
                    .to_string()
            ]
        );
        Ok(())
    }
}
