//! HTTP surface: `/manga`, `/sources`, `/health`, and the mirrored image directory.

use crate::formats::{self, FormatError, ResponseFormat};
use crate::model::Quality;
use crate::scraper::{HttpClient, Source};
use crate::service::{self, FetchError, FetchOptions, MangaRequest, ServiceSettings};
use anyhow::Context;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE, HOST};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const CROSS_ORIGIN_RESOURCE_POLICY: HeaderName =
    HeaderName::from_static("cross-origin-resource-policy");
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Shared by all handlers. Cloned per request; the HTTP client shares its connection pool.
#[derive(Clone)]
pub struct AppState {
    pub client: HttpClient,
    pub settings: Arc<ServiceSettings>,
    /// Fixed origin for mirrored image links; when `None` it is derived from each request.
    pub public_base_url: Option<String>,
}

impl AppState {
    pub fn new(client: HttpClient, settings: ServiceSettings) -> Self {
        Self {
            client,
            settings: Arc::new(settings),
            public_base_url: None,
        }
    }

    pub fn with_public_base_url(mut self, url: Option<String>) -> Self {
        self.public_base_url = url
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty());
        self
    }
}

/// `/manga` query string. `name` and `chapters` are accepted as aliases.
#[derive(Debug, Default, Deserialize)]
pub struct MangaQuery {
    #[serde(alias = "name")]
    pub title: Option<String>,
    #[serde(alias = "chapters")]
    pub chapter: Option<String>,
    pub source: Option<String>,
    pub quality: Option<String>,
    pub language: Option<String>,
    pub format: Option<String>,
}

impl MangaQuery {
    fn into_request(self) -> MangaRequest {
        let mut request = MangaRequest::new(
            self.title.unwrap_or_default(),
            self.chapter.unwrap_or_default(),
        );
        request.source = self.source.unwrap_or_default();
        request.quality = self
            .quality
            .as_deref()
            .map(Quality::from_param)
            .unwrap_or_default();
        if let Some(lang) = self.language.filter(|l| !l.trim().is_empty()) {
            request.language = lang;
        }
        request
    }
}

#[derive(Debug, Serialize)]
struct SourceInfo {
    key: &'static str,
    name: &'static str,
    mirrors_images: bool,
}

/// Error response: `{ "error": <category>, "message": <detail> }`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    category: &'static str,
    message: String,
}

impl From<FetchError> for ApiError {
    fn from(e: FetchError) -> Self {
        Self {
            status: StatusCode::from_u16(e.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            category: e.category(),
            message: e.to_string(),
        }
    }
}

impl From<FormatError> for ApiError {
    fn from(e: FormatError) -> Self {
        let status = match e {
            FormatError::UnknownFormat(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            category: "invalid_format",
            message: e.to_string(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            category: "invalid_query",
            message: e.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, "{}", self.message);
        } else {
            warn!(status = %self.status, "{}", self.message);
        }
        let body = serde_json::json!({ "error": self.category, "message": self.message });
        (self.status, Json(body)).into_response()
    }
}

/// Origin for mirrored image links: the configured one, else `<proto>://<Host>`.
pub fn base_url(headers: &HeaderMap, configured: Option<&str>) -> String {
    if let Some(url) = configured {
        return url.to_string();
    }
    let proto = headers
        .get(X_FORWARDED_PROTO)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("http");
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{}://{}", proto, host)
}

async fn get_manga(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<MangaQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let format: ResponseFormat = query.format.as_deref().unwrap_or_default().parse()?;
    let request = query.into_request();
    let base = base_url(&headers, state.public_base_url.as_deref());
    info!(title = %request.title, chapter = %request.chapter, "manga request");

    let options = FetchOptions {
        base_url: &base,
        progress: None,
    };
    let response =
        service::fetch_manga(&state.client, &state.settings, &request, &options).await?;
    match format {
        ResponseFormat::Json => Ok(Json(response).into_response()),
        ResponseFormat::Xml => {
            let body = formats::render(&response, format)?;
            Ok(([(CONTENT_TYPE, format.content_type())], body).into_response())
        }
    }
}

async fn list_sources() -> Json<Vec<SourceInfo>> {
    Json(
        Source::ALL
            .into_iter()
            .map(|s| SourceInfo {
                key: s.key(),
                name: s.name(),
                mirrors_images: s.mirrors_images(),
            })
            .collect(),
    )
}

async fn health() -> &'static str {
    "OK"
}

/// Static route for mirrored images, readable from any origin.
fn image_routes(settings: &ServiceSettings) -> Router {
    let store = &settings.store;
    let dir = ServeDir::new(store.root());
    let router = if store.url_prefix() == "/" {
        Router::new().fallback_service(dir)
    } else {
        Router::new().nest_service(store.url_prefix(), dir)
    };
    router
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            CROSS_ORIGIN_RESOURCE_POLICY,
            HeaderValue::from_static("cross-origin"),
        ))
}

pub fn router(state: AppState) -> Router {
    let images = image_routes(&state.settings);
    Router::new()
        .route("/manga", get(get_manga))
        .route("/sources", get(list_sources))
        .route("/health", get(health))
        .with_state(state)
        .merge(images)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: AppState, bind: &str, port: u16) -> anyhow::Result<()> {
    let root = state.settings.store.root().to_path_buf();
    tokio::fs::create_dir_all(&root)
        .await
        .with_context(|| format!("creating storage directory {}", root.display()))?;

    let listener = TcpListener::bind((bind, port))
        .await
        .with_context(|| format!("binding {}:{}", bind, port))?;
    info!(
        "listening on {}, serving images from {} at {}",
        listener.local_addr()?,
        root.display(),
        state.settings.store.url_prefix()
    );
    axum::serve(listener, router(state))
        .await
        .context("server error")?;
    Ok(())
}
