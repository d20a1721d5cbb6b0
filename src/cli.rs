//! CLI parsing and orchestration. `serve` runs the HTTP service, `fetch` runs one request
//! and prints or writes the response, `sources` lists adapters. Maps errors to exit codes.

use crate::config::{self, Config};
use crate::formats::{self, FormatError, ResponseFormat};
use crate::model::Quality;
use crate::scraper::Source;
use crate::server::{self, AppState};
use crate::service::{self, FetchError, FetchOptions, MangaRequest, DEFAULT_LANGUAGE};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Fetch(#[from] FetchError),

    #[error("{0}")]
    Format(#[from] FormatError),

    #[error(transparent)]
    Server(#[from] anyhow::Error),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 1,
            CliRunError::Fetch(e) if e.status_code() == 400 => 1,
            CliRunError::Fetch(_) => 2,
            CliRunError::Format(_) | CliRunError::Server(_) => 3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "mangamirror")]
#[command(about = "Search manga sites, resolve chapter ranges, and serve page images")]
#[command(
    after_help = "Config file keys (bind, port, storage_root, static_prefix, public_base_url, user_agent, timeout_secs, retry_count, retry_base_delay_ms, max_chapters, fractional_chapters, default_source) are read from ./mangamirror.toml or the user config dir. CLI flags override config."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Print verbose error chain.
    #[arg(long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP service.
    Serve(ServeArgs),
    /// Resolve one request and print or write the response.
    Fetch(FetchArgs),
    /// List supported sources.
    Sources,
}

#[derive(clap::Args, Debug, Default)]
pub struct ClientArgs {
    /// Directory mirrored images are written to (overrides config; default ./downloads).
    #[arg(long)]
    pub storage_root: Option<PathBuf>,

    /// HTTP User-Agent (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Request timeout in seconds (overrides config; default 30).
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Listen address (overrides config; default 0.0.0.0).
    #[arg(long)]
    pub bind: Option<String>,

    /// Listen port (overrides PORT and config; default 10001).
    #[arg(short, long)]
    pub port: Option<u16>,

    #[command(flatten)]
    pub client: ClientArgs,
}

#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    /// Manga title to search for.
    #[arg(long)]
    pub title: String,

    /// Chapter expression: 3, 1-10, or 1,2,5-7.
    #[arg(long)]
    pub chapter: String,

    /// Source key (1-7) or name. Default: config default_source, else 1.
    #[arg(long)]
    pub source: Option<String>,

    /// Page quality: high keeps every page, low every other page.
    #[arg(long, default_value = "high", value_parser = parse_quality)]
    pub quality: Quality,

    /// Translation language for sites that have several (MangaDex).
    #[arg(long, default_value = DEFAULT_LANGUAGE)]
    pub language: String,

    /// Output format: json or xml.
    #[arg(long, default_value = "json", value_parser = parse_format)]
    pub format: ResponseFormat,

    /// Write the response to this file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Origin used in mirrored image URLs (default: public_base_url, else http://localhost:<port>).
    #[arg(long)]
    pub base_url: Option<String>,

    /// Suppress progress output (errors only).
    #[arg(short, long)]
    pub quiet: bool,

    #[command(flatten)]
    pub client: ClientArgs,
}

fn parse_quality(s: &str) -> Result<Quality, String> {
    match s.to_lowercase().as_str() {
        "high" => Ok(Quality::High),
        "low" => Ok(Quality::Low),
        _ => Err(format!(
            "Invalid --quality value: '{}'. Use high or low.",
            s
        )),
    }
}

fn parse_format(s: &str) -> Result<ResponseFormat, String> {
    s.parse::<ResponseFormat>()
        .map_err(|_| format!("Invalid --format value: '{}'. Use json or xml.", s))
}

/// Ensure output path parent exists.
fn validate_output_path(path: &Path) -> Result<(), CliRunError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(CliRunError::InvalidInput(format!(
                "Cannot write output: {}: parent directory does not exist.",
                path.display()
            )));
        }
    }
    Ok(())
}

/// Config file merged with CLI overrides.
fn load_with_overrides(overrides: &ClientArgs) -> Result<Config, CliRunError> {
    let mut config = config::load_config()
        .map_err(CliRunError::InvalidInput)?
        .unwrap_or_default();
    if let Some(root) = &overrides.storage_root {
        config.storage_root = Some(root.clone());
    }
    if let Some(ua) = &overrides.user_agent {
        config.user_agent = Some(ua.clone());
    }
    if let Some(secs) = overrides.timeout {
        config.timeout_secs = Some(secs);
    }
    Ok(config)
}

fn port_from_env(cli: Option<u16>, config: &Config) -> Result<u16, CliRunError> {
    let env = std::env::var("PORT").ok();
    config::effective_port(cli, env.as_deref(), config.port).map_err(CliRunError::InvalidInput)
}

fn progress_bar(total: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
        .map(|s| {
            s.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                .progress_chars("█▉▊▋▌▍▎▏ ")
        })
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

async fn run_serve(args: &ServeArgs) -> Result<(), CliRunError> {
    let config = load_with_overrides(&args.client)?;
    let port = port_from_env(args.port, &config)?;
    let bind = args
        .bind
        .clone()
        .unwrap_or_else(|| config.bind().to_string());
    let settings = config
        .service_settings()
        .map_err(CliRunError::InvalidInput)?;
    let client = config
        .http_client()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;
    let state =
        AppState::new(client, settings).with_public_base_url(config.public_base_url.clone());
    server::serve(state, &bind, port).await?;
    Ok(())
}

async fn run_fetch(args: &FetchArgs) -> Result<(), CliRunError> {
    if let Some(path) = &args.output {
        validate_output_path(path)?;
    }
    let config = load_with_overrides(&args.client)?;
    let settings = config
        .service_settings()
        .map_err(CliRunError::InvalidInput)?;
    let client = config
        .http_client()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;
    let base_url = match args.base_url.clone().or_else(|| config.public_base_url.clone()) {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => format!("http://localhost:{}", port_from_env(None, &config)?),
    };

    let mut request = MangaRequest::new(args.title.clone(), args.chapter.clone());
    request.source = args.source.clone().unwrap_or_default();
    request.quality = args.quality;
    request.language = args.language.clone();

    let bar: OnceLock<ProgressBar> = OnceLock::new();
    let on_progress = |done: usize, total: usize| {
        if total == 0 {
            return;
        }
        let pb = bar.get_or_init(|| progress_bar(total));
        pb.set_position(done as u64);
        pb.set_message(format!("Fetching chapter {}/{}", done, total));
    };
    let progress: Option<&(dyn Fn(usize, usize) + Send + Sync)> = if args.quiet {
        None
    } else {
        Some(&on_progress)
    };
    let options = FetchOptions {
        base_url: &base_url,
        progress,
    };
    let result = service::fetch_manga(&client, &settings, &request, &options).await;
    if let Some(pb) = bar.get() {
        pb.disable_steady_tick();
        pb.finish_and_clear();
    }
    let response = result?;

    match &args.output {
        Some(path) => {
            formats::write_response(&response, args.format, path)?;
            if !args.quiet {
                eprintln!(
                    "Wrote {} ({} chapters)",
                    path.display(),
                    response.chapters.len()
                );
            }
        }
        None => println!("{}", formats::render(&response, args.format)?),
    }
    Ok(())
}

fn run_sources() {
    for source in Source::ALL {
        let images = if source.mirrors_images() {
            "mirrored"
        } else {
            "remote"
        };
        println!("{}  {:<13} images: {}", source.key(), source.name(), images);
    }
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub async fn run(args: &Args) -> Result<(), CliRunError> {
    match &args.command {
        Command::Serve(serve) => run_serve(serve).await,
        Command::Fetch(fetch) => run_fetch(fetch).await,
        Command::Sources => {
            run_sources();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::RangeError;
    use crate::scraper::ScraperError;

    #[test]
    fn parse_quality_values() {
        assert_eq!(parse_quality("high").unwrap(), Quality::High);
        assert_eq!(parse_quality("LOW").unwrap(), Quality::Low);
        assert!(parse_quality("medium").is_err());
    }

    #[test]
    fn parse_format_values() {
        assert_eq!(parse_format("json").unwrap(), ResponseFormat::Json);
        assert_eq!(parse_format("Xml").unwrap(), ResponseFormat::Xml);
        assert!(parse_format("pdf").unwrap_err().contains("Use json or xml"));
    }

    #[test]
    fn fetch_args_parse_with_defaults() {
        let args = Args::try_parse_from([
            "mangamirror",
            "fetch",
            "--title",
            "One Piece",
            "--chapter",
            "1-3",
        ])
        .unwrap();
        match args.command {
            Command::Fetch(f) => {
                assert_eq!(f.title, "One Piece");
                assert_eq!(f.chapter, "1-3");
                assert_eq!(f.quality, Quality::High);
                assert_eq!(f.format, ResponseFormat::Json);
                assert_eq!(f.language, "en");
                assert!(f.source.is_none());
                assert!(!f.quiet);
            }
            other => panic!("expected fetch, got {:?}", other),
        }
    }

    #[test]
    fn serve_args_and_global_verbose() {
        let args = Args::try_parse_from([
            "mangamirror",
            "serve",
            "--port",
            "8080",
            "--storage-root",
            "/tmp/m",
            "--verbose",
        ])
        .unwrap();
        assert!(args.verbose);
        match args.command {
            Command::Serve(s) => {
                assert_eq!(s.port, Some(8080));
                assert_eq!(s.client.storage_root, Some(PathBuf::from("/tmp/m")));
                assert!(s.bind.is_none());
            }
            other => panic!("expected serve, got {:?}", other),
        }
    }

    #[test]
    fn fetch_requires_title_and_chapter() {
        assert!(Args::try_parse_from(["mangamirror", "fetch", "--title", "x"]).is_err());
        assert!(Args::try_parse_from(["mangamirror", "fetch", "--chapter", "1"]).is_err());
    }

    #[test]
    fn validate_output_path_parent_exists() {
        let path = std::env::temp_dir().join("mangamirror_cli_test_output.json");
        assert!(validate_output_path(&path).is_ok());
    }

    #[test]
    fn validate_output_path_parent_missing() {
        let path = PathBuf::from("/nonexistent_dir_mangamirror_xyz/output.json");
        let result = validate_output_path(&path);
        assert!(result.is_err());
        if let Err(CliRunError::InvalidInput(msg)) = result {
            assert!(msg.contains("parent directory does not exist"));
        }
    }

    #[test]
    fn cli_run_error_exit_codes() {
        assert_eq!(CliRunError::InvalidInput("x".into()).exit_code(), 1);
        let bad_range = FetchError::InvalidRange(RangeError::InvalidRange {
            input: "5-1".into(),
            reason: "inverted".into(),
        });
        assert_eq!(CliRunError::Fetch(bad_range).exit_code(), 1);
        assert_eq!(
            CliRunError::Fetch(FetchError::MissingParameter("title")).exit_code(),
            1
        );
        let upstream = FetchError::from(ScraperError::parse("page", "bad"));
        assert_eq!(CliRunError::Fetch(upstream).exit_code(), 2);
        let not_found = FetchError::NoResults { query: "x".into() };
        assert_eq!(CliRunError::Fetch(not_found).exit_code(), 2);
        assert_eq!(
            CliRunError::Format(FormatError::UnknownFormat("pdf".into())).exit_code(),
            3
        );
        assert_eq!(
            CliRunError::Server(anyhow::anyhow!("bind failed")).exit_code(),
            3
        );
    }
}
