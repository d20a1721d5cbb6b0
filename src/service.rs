//! Request pipeline shared by the HTTP handler and the `fetch` command.

use crate::matcher;
use crate::mirror::{MirrorError, MirrorStore};
use crate::model::{ChapterImages, ChapterNumber, MangaResponse, Quality, TitleCandidate};
use crate::range::{self, RangeError, RangeLimits};
use crate::scraper::{HttpClient, MangaSite, ScraperError, Source};
use thiserror::Error;
use tracing::{info, warn};

/// Results requested from the site search; the best of these is picked by title distance.
pub const SEARCH_LIMIT: usize = 1;
pub const DEFAULT_LANGUAGE: &str = "en";

/// One manga request as received from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MangaRequest {
    pub title: String,
    pub chapter: String,
    /// Source key or name; empty means the configured default.
    pub source: String,
    pub quality: Quality,
    pub language: String,
}

impl MangaRequest {
    pub fn new(title: impl Into<String>, chapter: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            chapter: chapter.into(),
            source: String::new(),
            quality: Quality::High,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    /// Requested language, or the default when blank.
    pub fn language(&self) -> &str {
        match self.language.trim() {
            "" => DEFAULT_LANGUAGE,
            lang => lang,
        }
    }
}

/// Settings that stay fixed for the life of the process.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub limits: RangeLimits,
    pub default_source: Source,
    pub store: MirrorStore,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            limits: RangeLimits::default(),
            default_source: Source::MangaReader,
            store: MirrorStore::default(),
        }
    }
}

/// Per-call options.
#[derive(Default)]
pub struct FetchOptions<'a> {
    /// Prefix for mirrored image URLs, e.g. `http://localhost:10001`.
    pub base_url: &'a str,
    /// Called with (chapters done, chapters total) after each chapter.
    pub progress: Option<&'a (dyn Fn(usize, usize) + Send + Sync)>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Missing required parameter '{0}'.")]
    MissingParameter(&'static str),

    #[error(transparent)]
    InvalidRange(#[from] RangeError),

    #[error("Unsupported source '{key}'. Use one of: {known}.")]
    UnsupportedSource { key: String, known: String },

    #[error("No manga found for '{query}'.")]
    NoResults { query: String },

    #[error("Upstream site failed: {0}")]
    Upstream(#[source] ScraperError),

    #[error("Could not mirror images: {0}")]
    Mirror(#[from] MirrorError),
}

impl From<ScraperError> for FetchError {
    fn from(e: ScraperError) -> Self {
        match e {
            ScraperError::UnsupportedSource { key, known } => {
                FetchError::UnsupportedSource { key, known }
            }
            ScraperError::NoResults { query } => FetchError::NoResults { query },
            other => FetchError::Upstream(other),
        }
    }
}

impl FetchError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            FetchError::MissingParameter(_)
            | FetchError::InvalidRange(_)
            | FetchError::UnsupportedSource { .. } => 400,
            FetchError::NoResults { .. } => 404,
            FetchError::Upstream(_) => 502,
            FetchError::Mirror(_) => 500,
        }
    }

    /// Short machine-readable category for error bodies.
    pub fn category(&self) -> &'static str {
        match self {
            FetchError::MissingParameter(_) => "missing_parameter",
            FetchError::InvalidRange(_) => "invalid_range",
            FetchError::UnsupportedSource { .. } => "unsupported_source",
            FetchError::NoResults { .. } => "not_found",
            FetchError::Upstream(_) => "upstream_error",
            FetchError::Mirror(_) => "mirror_error",
        }
    }
}

fn require<'r>(value: &'r str, name: &'static str) -> Result<&'r str, FetchError> {
    let value = value.trim();
    if value.is_empty() {
        Err(FetchError::MissingParameter(name))
    } else {
        Ok(value)
    }
}

/// Resolve the request's source, falling back to the configured default when none is given.
pub fn resolve_source(
    request: &MangaRequest,
    settings: &ServiceSettings,
) -> Result<Source, FetchError> {
    if request.source.trim().is_empty() {
        Ok(settings.default_source)
    } else {
        Ok(Source::from_key(&request.source)?)
    }
}

/// Fetch each chapter's pages in order, mirroring them when the site requires it.
///
/// A chapter the site cannot locate is logged and left out. Any other failure aborts.
/// `options.progress` is called after every chapter, skipped ones included.
pub async fn collect_chapters<S: MangaSite>(
    site: &S,
    client: &HttpClient,
    store: &MirrorStore,
    candidate: &TitleCandidate,
    chapters: Vec<ChapterNumber>,
    request: &MangaRequest,
    options: &FetchOptions<'_>,
) -> Result<Vec<ChapterImages>, FetchError> {
    let referer = site.referer(candidate);
    let total = chapters.len();
    let mut out = Vec::with_capacity(total);
    for (done, chapter) in chapters.into_iter().enumerate() {
        match site
            .chapter_pages(client, candidate, chapter, request.language())
            .await
        {
            Ok(pages) => {
                let selected = request.quality.select(pages);
                let images = if site.mirrors_images() {
                    store
                        .mirror_chapter(
                            client,
                            options.base_url,
                            &candidate.title,
                            chapter,
                            &selected,
                            referer.as_deref(),
                        )
                        .await?
                } else {
                    selected.into_iter().map(|(_, url)| url).collect()
                };
                out.push(ChapterImages { chapter, images });
            }
            Err(ScraperError::ChapterNotFound { title, chapter: missing }) => {
                warn!(%title, chapter = %missing, "chapter not found, skipping");
            }
            Err(e) => return Err(e.into()),
        }
        if let Some(progress) = options.progress {
            progress(done + 1, total);
        }
    }
    Ok(out)
}

/// Run the full pipeline for one request.
///
/// Everything that can be rejected locally (missing fields, chapter expression, source key)
/// is checked before the first network call. Chapters the site cannot locate are logged
/// and left out of the response; any other failure aborts the request.
pub async fn fetch_manga(
    client: &HttpClient,
    settings: &ServiceSettings,
    request: &MangaRequest,
    options: &FetchOptions<'_>,
) -> Result<MangaResponse, FetchError> {
    let query = require(&request.title, "title")?;
    let expr = range::parse(require(&request.chapter, "chapter")?)?;
    let source = resolve_source(request, settings)?;

    let candidates = source.search(client, query, SEARCH_LIMIT).await?;
    let candidate = matcher::closest_match(query, &candidates, |c| c.title.as_str())
        .ok_or_else(|| FetchError::NoResults {
            query: query.to_string(),
        })?;
    info!(source = source.name(), title = %candidate.title, "matched title");

    let available = source.chapter_list(client, candidate).await?;
    let chapters = range::resolve(&expr, available.as_deref(), &settings.limits);
    info!(requested = %request.chapter, resolved = chapters.len(), "resolved chapters");

    let out = collect_chapters(
        &source,
        client,
        &settings.store,
        candidate,
        chapters,
        request,
        options,
    )
    .await?;

    Ok(MangaResponse {
        manga: candidate.title.clone(),
        source: source.key().to_string(),
        chapters: out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> HttpClient {
        HttpClient::builder()
            .retry_count(1)
            .build()
            .expect("client")
    }

    #[test]
    fn scraper_errors_map_to_categories() {
        let e: FetchError = ScraperError::NoResults {
            query: "x".to_string(),
        }
        .into();
        assert_eq!(e.status_code(), 404);
        assert_eq!(e.category(), "not_found");

        let e: FetchError = ScraperError::parse("page", "bad").into();
        assert_eq!(e.status_code(), 502);
        assert_eq!(e.category(), "upstream_error");

        let e: FetchError = ScraperError::UnsupportedSource {
            key: "9".to_string(),
            known: "1".to_string(),
        }
        .into();
        assert_eq!(e.status_code(), 400);
    }

    #[test]
    fn resolve_source_uses_default_when_blank() -> Result<(), FetchError> {
        let settings = ServiceSettings {
            default_source: Source::MangaDex,
            ..ServiceSettings::default()
        };
        let mut request = MangaRequest::new("One Piece", "1");
        assert_eq!(resolve_source(&request, &settings)?, Source::MangaDex);
        request.source = "3".to_string();
        assert_eq!(resolve_source(&request, &settings)?, Source::Mangakakalot);
        Ok(())
    }

    #[tokio::test]
    async fn missing_fields_rejected_before_network() {
        let settings = ServiceSettings::default();
        let result = fetch_manga(
            &client(),
            &settings,
            &MangaRequest::new("  ", "1"),
            &FetchOptions::default(),
        )
        .await;
        assert!(matches!(result, Err(FetchError::MissingParameter("title"))));

        let result = fetch_manga(
            &client(),
            &settings,
            &MangaRequest::new("One Piece", ""),
            &FetchOptions::default(),
        )
        .await;
        assert!(matches!(result, Err(FetchError::MissingParameter("chapter"))));
    }

    #[tokio::test]
    async fn bad_range_and_source_rejected_before_network() {
        let settings = ServiceSettings::default();
        let result = fetch_manga(
            &client(),
            &settings,
            &MangaRequest::new("One Piece", "10-1"),
            &FetchOptions::default(),
        )
        .await;
        assert!(matches!(result, Err(FetchError::InvalidRange(_))));

        let mut request = MangaRequest::new("One Piece", "1-3");
        request.source = "42".to_string();
        let result = fetch_manga(&client(), &settings, &request, &FetchOptions::default()).await;
        match result {
            Err(e @ FetchError::UnsupportedSource { .. }) => assert_eq!(e.status_code(), 400),
            other => panic!("expected UnsupportedSource, got {:?}", other),
        }
    }

    enum Outcome {
        Pages(Vec<String>),
        Missing,
        Broken,
    }

    /// Site stand-in answering `chapter_pages` from a fixed table.
    struct FakeSite {
        mirrors: bool,
        chapters: Vec<(ChapterNumber, Outcome)>,
    }

    impl MangaSite for FakeSite {
        async fn search(
            &self,
            _client: &HttpClient,
            query: &str,
            _limit: usize,
        ) -> Result<Vec<TitleCandidate>, ScraperError> {
            Ok(vec![TitleCandidate::new(query, "fake")])
        }

        async fn chapter_list(
            &self,
            _client: &HttpClient,
            _candidate: &TitleCandidate,
        ) -> Result<Option<Vec<ChapterNumber>>, ScraperError> {
            Ok(Some(self.chapters.iter().map(|(n, _)| *n).collect()))
        }

        async fn chapter_pages(
            &self,
            _client: &HttpClient,
            candidate: &TitleCandidate,
            chapter: ChapterNumber,
            _language: &str,
        ) -> Result<Vec<String>, ScraperError> {
            match self.chapters.iter().find(|(n, _)| *n == chapter) {
                Some((_, Outcome::Pages(pages))) => Ok(pages.clone()),
                Some((_, Outcome::Broken)) => Err(ScraperError::parse("page", "no reader")),
                _ => Err(ScraperError::ChapterNotFound {
                    title: candidate.title.clone(),
                    chapter: chapter.to_string(),
                }),
            }
        }

        fn referer(&self, _candidate: &TitleCandidate) -> Option<String> {
            None
        }

        fn mirrors_images(&self) -> bool {
            self.mirrors
        }
    }

    fn pages(prefix: &str, n: usize) -> Outcome {
        Outcome::Pages((1..=n).map(|i| format!("{}/{}.png", prefix, i)).collect())
    }

    fn whole(ns: &[u32]) -> Vec<ChapterNumber> {
        ns.iter().map(|n| ChapterNumber::whole(*n)).collect()
    }

    #[tokio::test]
    async fn missing_chapter_is_skipped_and_rest_kept() -> Result<(), FetchError> {
        let site = FakeSite {
            mirrors: false,
            chapters: vec![
                (ChapterNumber::whole(1), pages("https://cdn/1", 2)),
                (ChapterNumber::whole(2), Outcome::Missing),
                (ChapterNumber::whole(3), pages("https://cdn/3", 1)),
            ],
        };
        let calls = std::sync::Mutex::new(Vec::new());
        let record = |done: usize, total: usize| {
            if let Ok(mut calls) = calls.lock() {
                calls.push((done, total));
            }
        };
        let options = FetchOptions {
            base_url: "http://svc",
            progress: Some(&record),
        };
        let candidate = TitleCandidate::new("Fake Title", "fake");
        let out = collect_chapters(
            &site,
            &client(),
            &MirrorStore::default(),
            &candidate,
            whole(&[1, 2, 3]),
            &MangaRequest::new("Fake Title", "1-3"),
            &options,
        )
        .await?;

        let numbers: Vec<ChapterNumber> = out.iter().map(|c| c.chapter).collect();
        assert_eq!(numbers, whole(&[1, 3]));
        assert_eq!(out[0].images, vec!["https://cdn/1/1.png", "https://cdn/1/2.png"]);
        assert_eq!(out[1].images, vec!["https://cdn/3/1.png"]);
        assert_eq!(
            *calls.lock().expect("lock"),
            vec![(1, 3), (2, 3), (3, 3)]
        );
        Ok(())
    }

    #[tokio::test]
    async fn other_site_errors_abort_the_request() {
        let site = FakeSite {
            mirrors: false,
            chapters: vec![
                (ChapterNumber::whole(1), pages("https://cdn/1", 1)),
                (ChapterNumber::whole(2), Outcome::Broken),
                (ChapterNumber::whole(3), pages("https://cdn/3", 1)),
            ],
        };
        let calls = std::sync::Mutex::new(Vec::new());
        let record = |done: usize, total: usize| {
            if let Ok(mut calls) = calls.lock() {
                calls.push((done, total));
            }
        };
        let options = FetchOptions {
            base_url: "http://svc",
            progress: Some(&record),
        };
        let result = collect_chapters(
            &site,
            &client(),
            &MirrorStore::default(),
            &TitleCandidate::new("Fake Title", "fake"),
            whole(&[1, 2, 3]),
            &MangaRequest::new("Fake Title", "1-3"),
            &options,
        )
        .await;

        match result {
            Err(e @ FetchError::Upstream(_)) => assert_eq!(e.status_code(), 502),
            other => panic!("expected Upstream, got {:?}", other),
        }
        assert_eq!(*calls.lock().expect("lock"), vec![(1, 3)]);
    }

    #[tokio::test]
    async fn low_quality_mirrors_every_other_page() -> Result<(), Box<dyn std::error::Error>> {
        use axum::extract::Path;
        use axum::routing::get;

        let app = axum::Router::new()
            .route("/img/:name", get(|Path(name): Path<String>| async move { name }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move { axum::serve(listener, app).await });

        let site = FakeSite {
            mirrors: true,
            chapters: vec![(
                ChapterNumber::whole(7),
                pages(&format!("http://{}/img", addr), 4),
            )],
        };
        let tmp = tempfile::tempdir()?;
        let store = MirrorStore::new(tmp.path(), "/images");
        let mut request = MangaRequest::new("Fake Title", "7");
        request.quality = Quality::Low;
        let options = FetchOptions {
            base_url: "http://svc",
            progress: None,
        };
        let out = collect_chapters(
            &site,
            &client(),
            &store,
            &TitleCandidate::new("Fake Title", "fake"),
            whole(&[7]),
            &request,
            &options,
        )
        .await?;

        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].images,
            vec![
                "http://svc/images/fake_title/chapter-7/page-001.png",
                "http://svc/images/fake_title/chapter-7/page-003.png",
            ]
        );
        let dir = tmp.path().join("fake_title/chapter-7");
        assert_eq!(std::fs::read_to_string(dir.join("page-001.png"))?, "1.png");
        assert_eq!(std::fs::read_to_string(dir.join("page-003.png"))?, "3.png");
        assert!(!dir.join("page-002.png").exists());
        Ok(())
    }

    #[test]
    fn blank_language_falls_back_to_default() {
        let mut request = MangaRequest::new("x", "1");
        request.language = "  ".to_string();
        assert_eq!(request.language(), "en");
        request.language = "fr".to_string();
        assert_eq!(request.language(), "fr");
    }
}
