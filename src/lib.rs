//! mangamirror: HTTP service and CLI that searches manga sites, resolves chapter ranges,
//! and mirrors chapter images for same-origin serving.

pub mod cli;
pub mod config;
pub mod formats;
pub mod matcher;
pub mod mirror;
pub mod model;
pub mod range;
pub mod scraper;
pub mod server;
pub mod service;

// Re-exports for CLI and consumers.
pub use formats::{render, write_response, FormatError, ResponseFormat};
pub use mirror::{MirrorError, MirrorStore};
pub use model::{ChapterImages, ChapterNumber, MangaResponse, Quality, TitleCandidate};
pub use range::{RangeError, RangeLimits};
pub use scraper::{HttpClient, HttpClientBuilder, MangaSite, ScraperError, Source};
pub use server::{router, AppState};
pub use service::{fetch_manga, FetchError, FetchOptions, MangaRequest, ServiceSettings};
