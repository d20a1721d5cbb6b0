//! ReadManhwa JSON API adapter.

use crate::model::{ChapterNumber, TitleCandidate};
use crate::scraper::{
    chapter_from_json, sorted_unique, FetchRequest, HttpClient, MangaSite, ScraperError,
};
use serde::Deserialize;
use serde_json::Value;

const BASE: &str = "https://readmanhwa.com";

pub struct ReadManhwa;

#[derive(Debug, Deserialize)]
struct ComicPage {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    data: Vec<Comic>,
}

#[derive(Debug, Deserialize)]
struct Comic {
    title: String,
    slug: String,
    #[serde(default)]
    uploaded_at: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChapterEntry {
    number: Value,
}

#[derive(Debug, Deserialize)]
struct ImageEntry {
    source_url: String,
}

fn api_request(url: &str) -> FetchRequest {
    FetchRequest::get(url)
        .query("nsfw", "true")
        .header("x-nsfw", "true")
}

fn to_candidates(page: ComicPage) -> Vec<TitleCandidate> {
    if page.total == 0 {
        return Vec::new();
    }
    page.data
        .into_iter()
        .map(|c| {
            let mut candidate = TitleCandidate::new(c.title, c.slug);
            candidate.updated = c.uploaded_at;
            candidate.status = c.status;
            candidate
        })
        .collect()
}

impl MangaSite for ReadManhwa {
    async fn search(
        &self,
        client: &HttpClient,
        query: &str,
        limit: usize,
    ) -> Result<Vec<TitleCandidate>, ScraperError> {
        let url = format!("{}/api/comics", BASE);
        let req = api_request(&url)
            .query("q", query)
            .query("per_page", limit.max(1).to_string())
            .query("sort", "title")
            .header("accept-language", "en");
        let page: ComicPage = client
            .json(&req)
            .await
            .map_err(|e| ScraperError::network(&url, e))?;
        let results = to_candidates(page);
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
        let url = format!("{}/api/comics/{}/chapters", BASE, candidate.id);
        let entries: Vec<ChapterEntry> = client
            .json(&api_request(&url))
            .await
            .map_err(|e| ScraperError::network(&url, e))?;
        Ok(Some(sorted_unique(
            entries.iter().filter_map(|e| chapter_from_json(&e.number)).collect(),
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
            "{}/api/comics/{}/chapter-{}/images",
            BASE, candidate.id, chapter
        );
        let images: Vec<ImageEntry> = client
            .json(&api_request(&url))
            .await
            .map_err(|e| ScraperError::network(&url, e))?;
        if images.is_empty() {
            return Err(ScraperError::ChapterNotFound {
                title: candidate.title.clone(),
                chapter: chapter.to_string(),
            });
        }
        Ok(images.into_iter().map(|i| i.source_url).collect())
    }

    fn referer(&self, _candidate: &TitleCandidate) -> Option<String> {
        Some(BASE.to_string())
    }
}
