//! Site adapters and scraping. Source selection, adapter trait, shared client, and adapters.

/// CSS selector parsed once per call site, on first use. Yields `Result<&'static Selector, ScraperError>`.
macro_rules! cached_selector {
    ($sel:expr) => {{
        static SELECTOR: ::std::sync::LazyLock<Result<::scraper::Selector, String>> =
            ::std::sync::LazyLock::new(|| {
                ::scraper::Selector::parse($sel)
                    .map_err(|e| format!("invalid selector {:?}: {}", $sel, e))
            });
        SELECTOR
            .as_ref()
            .map_err(|e| $crate::scraper::ScraperError::parse("selector", e.clone()))
    }};
}

/// Regex compiled once per call site, on first use. Yields `Result<&'static Regex, ScraperError>`.
macro_rules! cached_regex {
    ($pattern:expr) => {{
        static REGEX: ::std::sync::LazyLock<Result<::regex::Regex, String>> =
            ::std::sync::LazyLock::new(|| ::regex::Regex::new($pattern).map_err(|e| e.to_string()));
        REGEX
            .as_ref()
            .map_err(|e| $crate::scraper::ScraperError::parse("pattern", e.clone()))
    }};
}

mod client;
mod error;

pub mod fanfox;
pub mod gmanga;
pub mod manga4life;
pub mod mangadex;
pub mod mangakakalot;
pub mod mangareader;
pub mod readmanhwa;

pub use client::{
    retry, FetchRequest, HttpClient, HttpClientBuilder, RetryPolicy, DEFAULT_BASE_DELAY_MS,
    DEFAULT_RETRY_COUNT,
};
pub use error::ScraperError;

use crate::model::{ChapterNumber, TitleCandidate};
use regex::Regex;
use scraper::{ElementRef, Selector};
use std::fmt;
use std::str::FromStr;

/// Trimmed text of the first element matching `sel` under `el`, if non-empty.
pub(crate) fn first_text(el: ElementRef<'_>, sel: &Selector) -> Option<String> {
    el.select(sel)
        .next()
        .map(|e| e.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Attribute of the first element matching `sel` under `el`, if non-empty.
pub(crate) fn first_attr(el: ElementRef<'_>, sel: &Selector, attr: &str) -> Option<String> {
    el.select(sel)
        .next()
        .and_then(|e| e.value().attr(attr))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Chapter number from a link like ".../chapter-12.5".
pub(crate) fn chapter_from_href(re: &Regex, href: &str) -> Option<ChapterNumber> {
    re.captures(href)
        .and_then(|c| c.get(1))
        .and_then(|m| ChapterNumber::parse_lenient(m.as_str()))
}

/// Chapter number from a JSON value; APIs send both `2.5` and `"2.5"`.
pub(crate) fn chapter_from_json(value: &serde_json::Value) -> Option<ChapterNumber> {
    match value {
        serde_json::Value::Number(n) => n
            .as_f64()
            .and_then(|f| ChapterNumber::parse_lenient(&f.to_string())),
        serde_json::Value::String(s) => ChapterNumber::parse_lenient(s.trim()),
        _ => None,
    }
}

/// Sites list newest first and sometimes repeat links; callers want ascending and unique.
pub(crate) fn sorted_unique(mut chapters: Vec<ChapterNumber>) -> Vec<ChapterNumber> {
    chapters.sort();
    chapters.dedup();
    chapters
}

/// Capture group 1 of `re` in `html`, for `vm.Foo = [...];` style script assignments.
pub(crate) fn script_capture<'h>(html: &'h str, re: &Regex) -> Option<&'h str> {
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
}

pub(crate) fn decode_json<T: serde::de::DeserializeOwned>(
    url: &str,
    raw: &str,
) -> Result<T, ScraperError> {
    serde_json::from_str(raw).map_err(|e| ScraperError::Json {
        url: url.to_string(),
        source: e,
    })
}

/// Capabilities every adapter provides.
///
/// `chapter_list` returns `None` when the site cannot enumerate chapters up front;
/// the range is then resolved without clamping and missing chapters surface as
/// [ScraperError::ChapterNotFound] from `chapter_pages`.
#[allow(async_fn_in_trait)]
pub trait MangaSite {
    async fn search(
        &self,
        client: &HttpClient,
        query: &str,
        limit: usize,
    ) -> Result<Vec<TitleCandidate>, ScraperError>;

    async fn chapter_list(
        &self,
        client: &HttpClient,
        candidate: &TitleCandidate,
    ) -> Result<Option<Vec<ChapterNumber>>, ScraperError>;

    async fn chapter_pages(
        &self,
        client: &HttpClient,
        candidate: &TitleCandidate,
        chapter: ChapterNumber,
        language: &str,
    ) -> Result<Vec<String>, ScraperError>;

    /// Referer to send when fetching this title's pages and images.
    fn referer(&self, candidate: &TitleCandidate) -> Option<String>;

    /// Whether page images must be downloaded and re-served (hotlinking is blocked).
    fn mirrors_images(&self) -> bool {
        false
    }
}

/// Supported site, selected by key ("1".."7") or name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    MangaReader,
    MangaDex,
    Mangakakalot,
    Manga4Life,
    Fanfox,
    ReadManhwa,
    Gmanga,
}

macro_rules! dispatch {
    ($source:expr, $site:ident => $call:expr) => {
        match $source {
            Source::MangaReader => {
                let $site = mangareader::MangaReader;
                $call
            }
            Source::MangaDex => {
                let $site = mangadex::MangaDex;
                $call
            }
            Source::Mangakakalot => {
                let $site = mangakakalot::Mangakakalot;
                $call
            }
            Source::Manga4Life => {
                let $site = manga4life::Manga4Life;
                $call
            }
            Source::Fanfox => {
                let $site = fanfox::Fanfox;
                $call
            }
            Source::ReadManhwa => {
                let $site = readmanhwa::ReadManhwa;
                $call
            }
            Source::Gmanga => {
                let $site = gmanga::Gmanga;
                $call
            }
        }
    };
}

impl Source {
    pub const ALL: [Source; 7] = [
        Source::MangaReader,
        Source::MangaDex,
        Source::Mangakakalot,
        Source::Manga4Life,
        Source::Fanfox,
        Source::ReadManhwa,
        Source::Gmanga,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Source::MangaReader => "1",
            Source::MangaDex => "2",
            Source::Mangakakalot => "3",
            Source::Manga4Life => "4",
            Source::Fanfox => "5",
            Source::ReadManhwa => "6",
            Source::Gmanga => "7",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Source::MangaReader => "mangareader",
            Source::MangaDex => "mangadex",
            Source::Mangakakalot => "mangakakalot",
            Source::Manga4Life => "manga4life",
            Source::Fanfox => "fanfox",
            Source::ReadManhwa => "readmanhwa",
            Source::Gmanga => "gmanga",
        }
    }

    /// Resolve a key or name. Unknown keys are an error rather than a silent default.
    pub fn from_key(key: &str) -> Result<Source, ScraperError> {
        let k = key.trim().to_lowercase();
        Source::ALL
            .into_iter()
            .find(|s| s.key() == k || s.name() == k)
            .ok_or_else(|| ScraperError::UnsupportedSource {
                key: key.to_string(),
                known: Source::ALL
                    .iter()
                    .map(|s| format!("{} ({})", s.key(), s.name()))
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    pub fn mirrors_images(self) -> bool {
        dispatch!(self, site => site.mirrors_images())
    }

    pub fn referer(self, candidate: &TitleCandidate) -> Option<String> {
        dispatch!(self, site => site.referer(candidate))
    }

    pub async fn search(
        self,
        client: &HttpClient,
        query: &str,
        limit: usize,
    ) -> Result<Vec<TitleCandidate>, ScraperError> {
        dispatch!(self, site => site.search(client, query, limit).await)
    }

    pub async fn chapter_list(
        self,
        client: &HttpClient,
        candidate: &TitleCandidate,
    ) -> Result<Option<Vec<ChapterNumber>>, ScraperError> {
        dispatch!(self, site => site.chapter_list(client, candidate).await)
    }

    pub async fn chapter_pages(
        self,
        client: &HttpClient,
        candidate: &TitleCandidate,
        chapter: ChapterNumber,
        language: &str,
    ) -> Result<Vec<String>, ScraperError> {
        dispatch!(self, site => site.chapter_pages(client, candidate, chapter, language).await)
    }
}

impl MangaSite for Source {
    async fn search(
        &self,
        client: &HttpClient,
        query: &str,
        limit: usize,
    ) -> Result<Vec<TitleCandidate>, ScraperError> {
        Source::search(*self, client, query, limit).await
    }

    async fn chapter_list(
        &self,
        client: &HttpClient,
        candidate: &TitleCandidate,
    ) -> Result<Option<Vec<ChapterNumber>>, ScraperError> {
        Source::chapter_list(*self, client, candidate).await
    }

    async fn chapter_pages(
        &self,
        client: &HttpClient,
        candidate: &TitleCandidate,
        chapter: ChapterNumber,
        language: &str,
    ) -> Result<Vec<String>, ScraperError> {
        Source::chapter_pages(*self, client, candidate, chapter, language).await
    }

    fn referer(&self, candidate: &TitleCandidate) -> Option<String> {
        Source::referer(*self, candidate)
    }

    fn mirrors_images(&self) -> bool {
        Source::mirrors_images(*self)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Source {
    type Err = ScraperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Source::from_key(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_from_key_and_name() -> Result<(), ScraperError> {
        assert_eq!(Source::from_key("1")?, Source::MangaReader);
        assert_eq!(Source::from_key("2")?, Source::MangaDex);
        assert_eq!(Source::from_key(" 4 ")?, Source::Manga4Life);
        assert_eq!(Source::from_key("MangaDex")?, Source::MangaDex);
        assert_eq!("gmanga".parse::<Source>()?, Source::Gmanga);
        Ok(())
    }

    #[test]
    fn unknown_source_is_rejected() -> Result<(), String> {
        match Source::from_key("99") {
            Err(ScraperError::UnsupportedSource { key, known }) => {
                assert_eq!(key, "99");
                assert!(known.contains("1 (mangareader)"));
                Ok(())
            }
            other => Err(format!("expected UnsupportedSource, got {:?}", other)),
        }
    }

    #[test]
    fn keys_are_unique_and_round_trip() -> Result<(), ScraperError> {
        for source in Source::ALL {
            assert_eq!(Source::from_key(source.key())?, source);
            assert_eq!(Source::from_key(source.name())?, source);
        }
        Ok(())
    }

    #[test]
    fn only_hotlink_protected_sites_mirror() {
        let mirrored: Vec<Source> = Source::ALL
            .into_iter()
            .filter(|s| s.mirrors_images())
            .collect();
        assert_eq!(mirrored, vec![Source::MangaReader, Source::Mangakakalot]);
    }

    #[test]
    fn chapter_from_href_reads_decimal() -> Result<(), ScraperError> {
        let re = cached_regex!(r"chapter-(\d+(?:\.\d+)?)")?;
        assert_eq!(
            chapter_from_href(re, "https://example.com/manga/x/chapter-12.5"),
            Some(ChapterNumber::from_tenths(125))
        );
        assert_eq!(chapter_from_href(re, "https://example.com/manga/x"), None);
        Ok(())
    }

    fn chapter_link_re() -> Result<&'static Regex, ScraperError> {
        cached_regex!(r"chapter-(\d+)")
    }

    #[test]
    fn cached_pattern_compiles_once() -> Result<(), ScraperError> {
        assert!(std::ptr::eq(chapter_link_re()?, chapter_link_re()?));
        let bad: Result<&Regex, ScraperError> = cached_regex!(r"chapter-(\d+");
        assert!(matches!(bad, Err(ScraperError::Parse { what: "pattern", .. })));
        let bad: Result<&Selector, ScraperError> = cached_selector!("div[");
        assert!(matches!(bad, Err(ScraperError::Parse { what: "selector", .. })));
        Ok(())
    }

    #[test]
    fn sorted_unique_orders_ascending() {
        let got = sorted_unique(vec![
            ChapterNumber::whole(3),
            ChapterNumber::whole(1),
            ChapterNumber::whole(3),
            ChapterNumber::whole(2),
        ]);
        assert_eq!(
            got,
            vec![
                ChapterNumber::whole(1),
                ChapterNumber::whole(2),
                ChapterNumber::whole(3)
            ]
        );
    }
}
