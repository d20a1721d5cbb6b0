//! Fanfox mobile site adapter (m.fanfox.net).

use crate::model::{ChapterNumber, TitleCandidate};
use crate::scraper::{
    chapter_from_href, first_attr, first_text, sorted_unique, FetchRequest, HttpClient, MangaSite,
    ScraperError,
};
use regex::Regex;
use reqwest::Url;
use scraper::Html;

const BASE: &str = "http://m.fanfox.net";
const REFERER: &str = "https://fanfox.net";

pub struct Fanfox;

fn search_url(query: &str) -> Result<String, ScraperError> {
    Url::parse_with_params(&format!("{}/search", BASE), &[("k", query)])
        .map(|u| u.to_string())
        .map_err(|e| ScraperError::InvalidUrl {
            input: query.to_string(),
            reason: e.to_string(),
        })
}

/// `//m.fanfox.net/manga/one_piece/` -> `one_piece`
fn slug_from_href(re: &Regex, href: &str) -> Option<String> {
    re.captures(href)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn parse_search(html: &str, limit: usize) -> Result<Vec<TitleCandidate>, ScraperError> {
    let doc = Html::parse_document(html);
    let item_sel = cached_selector!(".post-one.clearfix")?;
    let title_sel = cached_selector!(".title")?;
    let link_sel = cached_selector!("a")?;
    let status_sel = cached_selector!(".status")?;
    let slug_re = cached_regex!(r"/manga/([^/?#]+)")?;

    let mut results = Vec::new();
    for item in doc.select(item_sel).take(limit) {
        let Some(title) = first_text(item, title_sel) else {
            continue;
        };
        let Some(slug) =
            first_attr(item, link_sel, "href").and_then(|h| slug_from_href(slug_re, &h))
        else {
            continue;
        };
        let mut candidate = TitleCandidate::new(title, slug);
        candidate.status = first_text(item, status_sel);
        results.push(candidate);
    }
    Ok(results)
}

fn parse_chapter_list(html: &str) -> Result<Vec<ChapterNumber>, ScraperError> {
    let doc = Html::parse_document(html);
    let link_sel = cached_selector!(r#"a[href*="/manga/"]"#)?;
    let re = cached_regex!(r"/c(\d+(?:\.\d+)?)/")?;
    let chapters = doc
        .select(link_sel)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| chapter_from_href(re, href))
        .collect();
    Ok(sorted_unique(chapters))
}

fn parse_pages(html: &str) -> Result<Vec<String>, ScraperError> {
    let doc = Html::parse_document(html);
    let img_sel = cached_selector!("img.reader-main-img")?;
    Ok(doc
        .select(img_sel)
        .filter_map(|img| img.value().attr("data-src"))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            if s.starts_with("//") {
                format!("https:{}", s)
            } else {
                s.to_string()
            }
        })
        .collect())
}

/// Reader path segment: `c007`, `c012.5`.
fn chapter_segment(chapter: ChapterNumber) -> String {
    if chapter.is_whole() {
        format!("c{:03}", chapter.integer_part())
    } else {
        format!("c{:03}.{}", chapter.integer_part(), chapter.decimal_digit())
    }
}

impl MangaSite for Fanfox {
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
        let url = format!("{}/manga/{}", BASE, candidate.id);
        let html = client
            .text(&FetchRequest::get(&url))
            .await
            .map_err(|e| ScraperError::network(&url, e))?;
        Ok(Some(parse_chapter_list(&html)?))
    }

    async fn chapter_pages(
        &self,
        client: &HttpClient,
        candidate: &TitleCandidate,
        chapter: ChapterNumber,
        _language: &str,
    ) -> Result<Vec<String>, ScraperError> {
        let url = format!(
            "{}/roll_manga/{}/{}/1.html",
            BASE,
            candidate.id,
            chapter_segment(chapter)
        );
        let html = client
            .text(&FetchRequest::get(&url).referer(Some(REFERER)))
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
        Some(REFERER.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_result_slug_from_link() -> Result<(), ScraperError> {
        let html = r#"<ul>
<li class="post-one clearfix"><a href="//m.fanfox.net/manga/one_piece/">
  <p class="title">One Piece</p><p class="status">Ongoing</p></a></li>
<li class="post-one clearfix"><a href="//m.fanfox.net/manga/one_piece_party/"><p class="title">One Piece Party</p></a></li>
<li class="post-one"><a href="//m.fanfox.net/manga/ignored/"><p class="title">Ignored</p></a></li>
</ul>"#;
        let got = parse_search(html, 10)?;
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].title, "One Piece");
        assert_eq!(got[0].id, "one_piece");
        assert_eq!(got[0].status.as_deref(), Some("Ongoing"));
        assert_eq!(got[1].id, "one_piece_party");
        assert_eq!(got[1].status, None);
        Ok(())
    }

    #[test]
    fn chapter_links_parsed_and_sorted() -> Result<(), ScraperError> {
        let html = r#"<div>
<a href="//m.fanfox.net/manga/one_piece/c1100/1.html">1100</a>
<a href="//m.fanfox.net/manga/one_piece/c002.5/1.html">2.5</a>
<a href="//m.fanfox.net/manga/one_piece/c001/1.html">1</a>
<a href="//m.fanfox.net/manga/one_piece/">cover</a>
<a href="/search?k=x">search</a>
</div>"#;
        assert_eq!(
            parse_chapter_list(html)?,
            vec![
                ChapterNumber::whole(1),
                ChapterNumber::from_tenths(25),
                ChapterNumber::whole(1100)
            ]
        );
        Ok(())
    }

    #[test]
    fn reader_images_use_data_src_with_scheme() -> Result<(), ScraperError> {
        let html = r#"<div>
<img class="reader-main-img" data-src="//zjcdn.mangafox.me/store/manga/106/001.0/compressed/q001.jpg"/>
<img class="reader-main-img" src="loading.gif"/>
</div>"#;
        assert_eq!(
            parse_pages(html)?,
            vec!["https://zjcdn.mangafox.me/store/manga/106/001.0/compressed/q001.jpg".to_string()]
        );
        Ok(())
    }

    #[test]
    fn chapter_segment_pads() {
        assert_eq!(chapter_segment(ChapterNumber::whole(7)), "c007");
        assert_eq!(chapter_segment(ChapterNumber::from_tenths(125)), "c012.5");
        assert_eq!(chapter_segment(ChapterNumber::whole(1100)), "c1100");
    }
}
