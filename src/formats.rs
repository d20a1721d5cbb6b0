//! Response renderers: JSON (default) and XML. Used by the HTTP handler and by `fetch --output`.

use crate::model::MangaResponse;
use std::fmt::Write as _;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Output format selector for the CLI and the `format` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Json,
    Xml,
}

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Unknown format '{0}'. Use json or xml.")]
    UnknownFormat(String),

    #[error("Failed to serialize response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to write output: {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ResponseFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            ResponseFormat::Json => "application/json",
            ResponseFormat::Xml => "application/xml; charset=utf-8",
        }
    }
}

impl FromStr for ResponseFormat {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "json" => Ok(ResponseFormat::Json),
            "xml" => Ok(ResponseFormat::Xml),
            other => Err(FormatError::UnknownFormat(other.to_string())),
        }
    }
}

pub(crate) fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn render_xml(response: &MangaResponse) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    // Writing into a String cannot fail.
    let _ = writeln!(
        out,
        "<manga title=\"{}\" source=\"{}\">",
        xml_escape(&response.manga),
        xml_escape(&response.source)
    );
    for chapter in &response.chapters {
        let _ = writeln!(out, "  <chapter number=\"{}\">", chapter.chapter);
        for image in &chapter.images {
            let _ = writeln!(out, "    <image>{}</image>", xml_escape(image));
        }
        out.push_str("  </chapter>\n");
    }
    out.push_str("</manga>\n");
    out
}

/// Render the response body.
pub fn render(response: &MangaResponse, format: ResponseFormat) -> Result<String, FormatError> {
    match format {
        ResponseFormat::Json => Ok(serde_json::to_string_pretty(response)?),
        ResponseFormat::Xml => Ok(render_xml(response)),
    }
}

/// Render and write to `path`, replacing any existing file.
pub fn write_response(
    response: &MangaResponse,
    format: ResponseFormat,
    path: &Path,
) -> Result<(), FormatError> {
    let body = render(response, format)?;
    std::fs::write(path, body).map_err(|e| FormatError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
