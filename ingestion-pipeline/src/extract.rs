use std::{net::IpAddr, path::Path, time::Duration};

use common::error::AppError;
use dom_smoothie::{Config, Readability, TextMode};
use tracing::{info, warn};

/// Budget for fetching a remote page.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(60);
/// Budget for parsing an uploaded file.
pub const EXTRACTION_TIMEOUT: Duration = Duration::from_secs(300);

/// Result of the extract stage: markdown text plus an optional title picked
/// up along the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub markdown: String,
    pub title: Option<String>,
}

impl Extracted {
    pub fn inline(text: &str) -> Self {
        Self {
            markdown: text.to_string(),
            title: None,
        }
    }
}

/// Fetches a page and reduces it to readable markdown.
pub async fn extract_from_url(url: &str) -> Result<Extracted, AppError> {
    let parsed =
        url::Url::parse(url).map_err(|_| AppError::Validation("Invalid URL".to_string()))?;
    ensure_ingestion_url_allowed(&parsed)?;

    info!("Fetching URL: {}", url);

    let fetch = async {
        let response = reqwest::get(parsed).await?.error_for_status()?;
        Ok::<_, AppError>(response.text().await?)
    };
    let html = tokio::time::timeout(FETCH_TIMEOUT, fetch)
        .await
        .map_err(|_| AppError::Timeout {
            stage: "extract",
            seconds: FETCH_TIMEOUT.as_secs(),
        })??;

    let config = Config {
        text_mode: TextMode::Markdown,
        ..Default::default()
    };
    let mut readability = Readability::new(html, None, Some(config))?;
    let article = readability.parse()?;

    Ok(Extracted {
        markdown: article.text_content.into(),
        title: Some(article.title),
    })
}

/// Parses an uploaded file to markdown-ish text. PDFs go through the blocking
/// extractor on the blocking pool; everything else is treated as text.
pub async fn extract_from_file(path: &Path) -> Result<Extracted, AppError> {
    let parse = async {
        let mime = mime_guess::from_path(path).first_or_octet_stream();

        let text = if mime.essence_str() == "application/pdf" {
            let path = path.to_path_buf();
            tokio::task::spawn_blocking(move || {
                pdf_extract::extract_text(&path)
                    .map_err(|e| AppError::Processing {
                        stage: "extract",
                        message: format!("pdf parsing failed: {e}"),
                    })
            })
            .await??
        } else {
            tokio::fs::read_to_string(path).await?
        };

        Ok::<_, AppError>(text)
    };

    let markdown = tokio::time::timeout(EXTRACTION_TIMEOUT, parse)
        .await
        .map_err(|_| AppError::Timeout {
            stage: "extract",
            seconds: EXTRACTION_TIMEOUT.as_secs(),
        })??;

    let title = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string());

    Ok(Extracted {
        markdown,
        title,
    })
}

fn ensure_ingestion_url_allowed(url: &url::Url) -> Result<(), AppError> {
    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            warn!(%url, %scheme, "Rejected ingestion URL due to unsupported scheme");
            return Err(AppError::Validation(
                "Unsupported URL scheme for ingestion".to_string(),
            ));
        }
    }

    let Some(host) = url.host_str() else {
        warn!(%url, "Rejected ingestion URL missing host");
        return Err(AppError::Validation(
            "URL is missing a host component".to_string(),
        ));
    };

    if host.eq_ignore_ascii_case("localhost") {
        warn!(%url, host, "Rejected ingestion URL to localhost");
        return Err(AppError::Validation(
            "Ingestion URL host is not allowed".to_string(),
        ));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        let is_disallowed = match ip {
            IpAddr::V4(v4) => v4.is_private() || v4.is_link_local(),
            IpAddr::V6(v6) => v6.is_unique_local() || v6.is_unicast_link_local(),
        };

        if ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() || is_disallowed {
            warn!(%url, host, %ip, "Rejected ingestion URL pointing to restricted network range");
            return Err(AppError::Validation(
                "Ingestion URL host is not allowed".to_string(),
            ));
        }
    }

    Ok(())
}
