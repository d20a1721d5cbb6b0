//! MangaReader (mangareader.to) adapter. HTML search, chapter list, and reader page.
//!
//! The image host rejects hotlinks, so pages are mirrored locally.

use crate::model::{ChapterNumber, TitleCandidate};
use crate::scraper::{
    chapter_from_href, first_attr, first_text, sorted_unique, FetchRequest, HttpClient, MangaSite,
    ScraperError,
};
use reqwest::Url;
use scraper::Html;

const BASE: &str = "https://mangareader.to";

pub struct MangaReader;

fn search_url(query: &str) -> Result<String, ScraperError> {
    Url::parse_with_params(&format!("{}/search", BASE), &[("keyword", query)])
        .map(|u| u.to_string())
        .map_err(|e| ScraperError::InvalidUrl {
            input: query.to_string(),
            reason: e.to_string(),
        })
}

/// Parse `.manga-item` entries from the search page.
fn parse_search(html: &str, limit: usize) -> Result<Vec<TitleCandidate>, ScraperError> {
    let doc = Html::parse_document(html);
    let item_sel = cached_selector!(".manga-item")?;
    let name_sel = cached_selector!(".manga-name")?;
    let link_sel = cached_selector!("a")?;
    let info_sel = cached_selector!(".fd-infor .fdi-item")?;

    let mut results = Vec::new();
    for item in doc.select(item_sel).take(limit) {
        let Some(name) = first_text(item, name_sel) else {
            continue;
        };
        let Some(href) = first_attr(item, link_sel, "href") else {
            continue;
        };
        let infos: Vec<String> = item
            .select(info_sel)
            .map(|e| e.text().collect::<String>().trim().to_string())
            .collect();
        let mut candidate = TitleCandidate::new(name, format!("{}{}", BASE, href));
        candidate.latest = infos.first().cloned();
        candidate.updated = infos.last().cloned();
        results.push(candidate);
    }
    Ok(results)
}

fn parse_chapter_list(html: &str) -> Result<Vec<ChapterNumber>, ScraperError> {
    let doc = Html::parse_document(html);
    let item_sel = cached_selector!(".chapter-list .chapter-item a")?;
    let re = cached_regex!(r"chapter-(\d+(?:\.\d+)?)")?;
    let chapters = doc
        .select(item_sel)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| chapter_from_href(re, href))
        .collect();
    Ok(sorted_unique(chapters))
}

/// Images in `.chapter-content`; lazy-loaded ones carry the URL in `data-src`.
fn parse_pages(html: &str) -> Result<Vec<String>, ScraperError> {
    let doc = Html::parse_document(html);
    let img_sel = cached_selector!(".chapter-content img")?;
    Ok(doc
        .select(img_sel)
        .filter_map(|img| {
            img.value()
                .attr("data-src")
                .or_else(|| img.value().attr("src"))
        })
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

impl MangaSite for MangaReader {
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
        let url = format!("{}/chapter-{}", candidate.id, chapter);
        let html = client
            .text(&FetchRequest::get(&url).referer(Some(BASE)))
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

    fn referer(&self, _candidate: &TitleCandidate) -> Option<String> {
        Some(BASE.to_string())
    }

    fn mirrors_images(&self) -> bool {
        true
    }
}
