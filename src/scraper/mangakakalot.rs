//! Mangakakalot adapter. Story search, chapter rows, and reader images.
//!
//! Images only load with the series page as Referer, so they are mirrored.

use crate::model::{ChapterNumber, TitleCandidate};
use crate::scraper::{
    chapter_from_href, first_attr, first_text, sorted_unique, FetchRequest, HttpClient, MangaSite,
    ScraperError,
};
use reqwest::Url;
use scraper::Html;

const BASE: &str = "https://mangakakalot.com";

pub struct Mangakakalot;

/// Search path segment uses underscores for spaces.
fn search_url(query: &str) -> Result<String, ScraperError> {
    let mut url = Url::parse(BASE).map_err(|e| ScraperError::InvalidUrl {
        input: BASE.to_string(),
        reason: e.to_string(),
    })?;
    url.path_segments_mut()
        .map_err(|_| ScraperError::InvalidUrl {
            input: BASE.to_string(),
            reason: "URL cannot be a base".to_string(),
        })?
        .extend(["search", "story", &query.trim().replace(' ', "_")]);
    Ok(url.to_string())
}

fn parse_search(html: &str, limit: usize) -> Result<Vec<TitleCandidate>, ScraperError> {
    let doc = Html::parse_document(html);
    let item_sel = cached_selector!(".story_item")?;
    let name_sel = cached_selector!(".story_name a")?;
    let latest_sel = cached_selector!(".story_chapter a")?;
    let right_sel = cached_selector!(".story_item_right")?;
    let updated_re = cached_regex!(r"Updated : ([^\n]*)")?;

    let mut results = Vec::new();
    for item in doc.select(item_sel).take(limit) {
        let (Some(name), Some(url)) = (
            first_text(item, name_sel),
            first_attr(item, name_sel, "href"),
        ) else {
            continue;
        };
        let updated = first_text(item, right_sel)
            .and_then(|t| {
                updated_re
                    .captures(&t)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().trim().to_string())
            })
            .unwrap_or_else(|| "Unknown".to_string());
        let mut candidate = TitleCandidate::new(name, url.clone());
        candidate.referer = Some(url);
        candidate.latest = first_attr(item, latest_sel, "title");
        candidate.updated = Some(updated);
        results.push(candidate);
    }
    Ok(results)
}

fn parse_chapter_list(html: &str) -> Result<Vec<ChapterNumber>, ScraperError> {
    let doc = Html::parse_document(html);
    let row_sel = cached_selector!(".chapter-list .row a")?;
    let re = cached_regex!(r"chapter[-_](\d+(?:\.\d+)?)")?;
    let chapters = doc
        .select(row_sel)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| chapter_from_href(re, href))
        .collect();
    Ok(sorted_unique(chapters))
}

fn parse_pages(html: &str) -> Result<Vec<String>, ScraperError> {
    let doc = Html::parse_document(html);
    let img_sel = cached_selector!(".container-chapter-reader img")?;
    Ok(doc
        .select(img_sel)
        .filter_map(|img| img.value().attr("src"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

impl MangaSite for Mangakakalot {
    async fn search(
        &self,
        client: &HttpClient,
        query: &str,
        limit: usize,
    ) -> Result<Vec<TitleCandidate>, ScraperError> {
        let url = search_url(query)?;
        let html = client
            .text(&FetchRequest::get(&url))
            .await
            .map_err(|e| ScraperError::network(&url, e))?;
        let results = parse_search(&html, limit)?;
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
        let html = client
            .text(&FetchRequest::get(&candidate.id))
            .await
            .map_err(|e| ScraperError::network(&candidate.id, e))?;
        Ok(Some(parse_chapter_list(&html)?))
    }

    async fn chapter_pages(
        &self,
        client: &HttpClient,
        candidate: &TitleCandidate,
        chapter: ChapterNumber,
        _language: &str,
    ) -> Result<Vec<String>, ScraperError> {
        let url = format!("{}/chapter-{}", candidate.id.trim_end_matches('/'), chapter);
        let referer = self.referer(candidate);
        let html = client
            .text(&FetchRequest::get(&url).referer(referer.as_deref()))
            .await
            .map_err(|e| ScraperError::network(&url, e))?;
        let pages = parse_pages(&html)?;
        if pages.is_empty() {
            return Err(ScraperError::ChapterNotFound {
                title: candidate.title.clone(),
                chapter: chapter.to_string(),
            });
        }
        Ok(pages)
    }

    fn referer(&self, candidate: &TitleCandidate) -> Option<String> {
        candidate
            .referer
            .clone()
            .or_else(|| Some(BASE.to_string()))
    }

    fn mirrors_images(&self) -> bool {
        true
    }
}
