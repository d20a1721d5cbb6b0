//! Local image mirror for sites that block hotlinking.
//!
//! Layout: `<root>/<safe_title>/chapter-<n>/page-<NNN><ext>`, served under `<prefix>/...`.

use crate::model::ChapterNumber;
use crate::scraper::{FetchRequest, HttpClient};
use futures::future::try_join_all;
use reqwest::Url;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_STORAGE_ROOT: &str = "downloads";
pub const DEFAULT_STATIC_PREFIX: &str = "/images";

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Failed to download image {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Lowercase, with every character outside `[a-z0-9]` replaced by `_`.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Extension of the URL's last path segment (with the dot), or `.jpg`.
pub fn extension_from_url(url: &str) -> String {
    let path = match Url::parse(url) {
        Ok(u) => u.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    let file = path.rsplit('/').next().unwrap_or_default();
    match file.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < file.len() => file[dot..].to_string(),
        _ => ".jpg".to_string(),
    }
}

/// `page-001.jpg` for the first page; `index` is zero-based.
pub fn page_file_name(index: usize, url: &str) -> String {
    format!("page-{:03}{}", index + 1, extension_from_url(url))
}

/// Where mirrored images live on disk and under which URL path they are served.
#[derive(Debug, Clone)]
pub struct MirrorStore {
    root: PathBuf,
    url_prefix: String,
}

impl Default for MirrorStore {
    fn default() -> Self {
        MirrorStore::new(DEFAULT_STORAGE_ROOT, DEFAULT_STATIC_PREFIX)
    }
}

impl MirrorStore {
    /// The prefix is normalized to a single leading `/` and no trailing `/`.
    pub fn new(root: impl Into<PathBuf>, url_prefix: &str) -> Self {
        let trimmed = url_prefix.trim().trim_matches('/');
        MirrorStore {
            root: root.into(),
            url_prefix: format!("/{}", trimmed),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    pub fn chapter_dir(&self, title: &str, chapter: ChapterNumber) -> PathBuf {
        self.root
            .join(sanitize_title(title))
            .join(format!("chapter-{}", chapter))
    }

    pub fn public_url(
        &self,
        base_url: &str,
        title: &str,
        chapter: ChapterNumber,
        file_name: &str,
    ) -> String {
        format!(
            "{}{}/{}/chapter-{}/{}",
            base_url.trim_end_matches('/'),
            self.url_prefix,
            sanitize_title(title),
            chapter,
            file_name
        )
    }

    /// Write one page's bytes, creating the chapter directory if needed. Existing files are overwritten.
    pub async fn write_page(
        &self,
        title: &str,
        chapter: ChapterNumber,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, MirrorError> {
        let dir = self.chapter_dir(title, chapter);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| MirrorError::Io {
                path: dir.clone(),
                source: e,
            })?;
        let path = dir.join(file_name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| MirrorError::Io {
                path: path.clone(),
                source: e,
            })?;
        Ok(path)
    }

    /// Download every page of a chapter concurrently and return their public URLs in page order.
    ///
    /// `pages` pairs each URL with its index in the site's original order, so a reduced
    /// selection keeps the original page numbers in file names.
    pub async fn mirror_chapter(
        &self,
        client: &HttpClient,
        base_url: &str,
        title: &str,
        chapter: ChapterNumber,
        pages: &[(usize, String)],
        referer: Option<&str>,
    ) -> Result<Vec<String>, MirrorError> {
        debug!(title, %chapter, pages = pages.len(), "mirroring chapter");
        let downloads = pages.iter().map(|(index, url)| async move {
            let req = FetchRequest::get(url.as_str()).referer(referer);
            let bytes = client
                .bytes(&req)
                .await
                .map_err(|e| MirrorError::Download {
                    url: url.clone(),
                    source: e,
                })?;
            let file_name = page_file_name(*index, url);
            self.write_page(title, chapter, &file_name, &bytes).await?;
            Ok::<_, MirrorError>(self.public_url(base_url, title, chapter, &file_name))
        });
        try_join_all(downloads).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::Router;

    #[test]
    fn sanitize_title_replaces_non_alnum() {
        assert_eq!(sanitize_title("One Piece"), "one_piece");
        assert_eq!(sanitize_title("Re:Zero - Kara"), "re_zero___kara");
        assert_eq!(sanitize_title("Solo Leveling!"), "solo_leveling_");
    }

    #[test]
    fn extension_from_url_or_jpg() {
        assert_eq!(extension_from_url("https://c.example/a/001.png?t=1"), ".png");
        assert_eq!(extension_from_url("https://c.example/a/001.webp#x"), ".webp");
        assert_eq!(extension_from_url("https://c.example/a/page"), ".jpg");
        assert_eq!(extension_from_url("https://c.example/"), ".jpg");
        assert_eq!(extension_from_url("not a url/p.gif"), ".gif");
        assert_eq!(extension_from_url("https://c.example/a/.hidden"), ".jpg");
    }

    #[test]
    fn page_file_name_is_one_based_and_padded() {
        assert_eq!(page_file_name(0, "https://x/1.png"), "page-001.png");
        assert_eq!(page_file_name(11, "https://x/12"), "page-012.jpg");
        assert_eq!(page_file_name(999, "https://x/a.jpg"), "page-1000.jpg");
    }

    #[test]
    fn prefix_is_normalized() {
        assert_eq!(MirrorStore::new("d", "images/").url_prefix(), "/images");
        assert_eq!(MirrorStore::new("d", "/static/img").url_prefix(), "/static/img");
        assert_eq!(MirrorStore::default().url_prefix(), "/images");
    }

    #[test]
    fn public_url_layout() {
        let store = MirrorStore::new("downloads", "/images");
        assert_eq!(
            store.public_url(
                "http://localhost:10001/",
                "One Piece",
                ChapterNumber::from_tenths(15),
                "page-003.png"
            ),
            "http://localhost:10001/images/one_piece/chapter-1.5/page-003.png"
        );
        assert_eq!(
            store.chapter_dir("One Piece", ChapterNumber::whole(2)),
            PathBuf::from("downloads").join("one_piece").join("chapter-2")
        );
    }

    #[tokio::test]
    async fn write_page_creates_dirs_and_overwrites() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = tempfile::tempdir()?;
        let store = MirrorStore::new(tmp.path(), "/images");
        let chapter = ChapterNumber::whole(1);

        let path = store.write_page("One Piece", chapter, "page-001.jpg", b"first").await?;
        assert_eq!(path, tmp.path().join("one_piece/chapter-1/page-001.jpg"));
        store.write_page("One Piece", chapter, "page-001.jpg", b"second").await?;
        assert_eq!(std::fs::read(&path)?, b"second");
        Ok(())
    }

    #[tokio::test]
    async fn mirror_chapter_downloads_in_page_order() -> Result<(), Box<dyn std::error::Error>> {
        let app = Router::new()
            .route("/img/a.png", get(|| async { "AAA" }))
            .route("/img/b", get(|| async { "BBB" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move { axum::serve(listener, app).await });

        let tmp = tempfile::tempdir()?;
        let store = MirrorStore::new(tmp.path(), "/images");
        let client = HttpClient::builder().retry_count(1).build()?;
        let pages = vec![
            (0, format!("http://{}/img/a.png", addr)),
            (2, format!("http://{}/img/b", addr)),
        ];
        let urls = store
            .mirror_chapter(
                &client,
                "http://svc",
                "Test Title",
                ChapterNumber::whole(4),
                &pages,
                Some("http://referer.example"),
            )
            .await?;
        assert_eq!(
            urls,
            vec![
                "http://svc/images/test_title/chapter-4/page-001.png".to_string(),
                "http://svc/images/test_title/chapter-4/page-003.jpg".to_string(),
            ]
        );
        let dir = tmp.path().join("test_title/chapter-4");
        assert_eq!(std::fs::read(dir.join("page-001.png"))?, b"AAA");
        assert_eq!(std::fs::read(dir.join("page-003.jpg"))?, b"BBB");
        Ok(())
    }

    #[tokio::test]
    async fn mirror_chapter_reports_failed_download() -> Result<(), Box<dyn std::error::Error>> {
        let app = Router::new();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move { axum::serve(listener, app).await });

        let tmp = tempfile::tempdir()?;
        let store = MirrorStore::new(tmp.path(), "/images");
        let client = HttpClient::builder().retry_count(1).build()?;
        let pages = vec![(0, format!("http://{}/missing.png", addr))];
        let result = store
            .mirror_chapter(&client, "http://svc", "t", ChapterNumber::whole(1), &pages, None)
            .await;
        assert!(matches!(result, Err(MirrorError::Download { .. })));
        Ok(())
    }
}
