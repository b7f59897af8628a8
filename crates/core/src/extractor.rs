use crate::error::IngestError;
use base64::{engine::general_purpose::STANDARD, Engine};
use lopdf::Document;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
struct RemoteExtractRequest {
    pdf_base64: String,
    source_path: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RemoteExtractResponse {
    pages: Option<Vec<RemotePage>>,
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RemotePage {
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    text: Option<String>,
}

/// Remote text-extraction service used when local parsing fails.
#[derive(Debug, Clone)]
pub struct RemoteEngineConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

impl RemoteEngineConfig {
    /// Builds a config from optional CLI/env values; blank endpoints disable it.
    pub fn from_parts(endpoint: Option<String>, api_key: Option<String>) -> Option<Self> {
        let endpoint = endpoint?.trim().to_string();
        if endpoint.is_empty() {
            return None;
        }

        let api_key = api_key.and_then(|value| {
            let key = value.trim().to_string();
            if key.is_empty() {
                None
            } else {
                Some(key)
            }
        });

        Some(Self { endpoint, api_key })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionConfig {
    pub remote_engine: Option<RemoteEngineConfig>,
}

/// Supplies the plain text of every page of a PDF, pages 1..N in order.
pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Clone, Default)]
pub struct LopdfExtractor {
    config: ExtractionConfig,
}

impl LopdfExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    fn extract_local(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| IngestError::PdfParse(error.to_string()))?;

            pages.push(PageText {
                number: page_no,
                text: join_text_items(&text),
            });
        }

        if pages.iter().all(|page| page.text.is_empty()) {
            return Err(IngestError::PdfParse(format!(
                "pdf had no readable page text: {}",
                path.display()
            )));
        }

        Ok(pages)
    }
}

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        match self.extract_local(path) {
            Ok(pages) => Ok(pages),
            Err(IngestError::PdfParse(parse_error)) => {
                let Some(remote) = &self.config.remote_engine else {
                    return Err(IngestError::PdfParse(parse_error));
                };

                warn!(path = %path.display(), error = %parse_error, "local extraction failed, trying remote engine");
                extract_with_remote_engine(remote, path).map_err(|remote_error| {
                    IngestError::PdfParse(format!(
                        "{parse_error}; remote extraction fallback failed: {remote_error}"
                    ))
                })
            }
            Err(error) => Err(error),
        }
    }
}

/// Collapses the extractor's line-separated text items into one line joined
/// by single spaces.
fn join_text_items(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn extract_with_remote_engine(
    config: &RemoteEngineConfig,
    path: &Path,
) -> Result<Vec<PageText>, IngestError> {
    tokio::task::block_in_place(|| extract_with_remote_engine_blocking(config, path))
}

fn extract_with_remote_engine_blocking(
    config: &RemoteEngineConfig,
    path: &Path,
) -> Result<Vec<PageText>, IngestError> {
    let pdf = std::fs::read(path)?;
    let payload = RemoteExtractRequest {
        pdf_base64: STANDARD.encode(pdf),
        source_path: path.to_string_lossy().to_string(),
    };

    debug!(endpoint = %config.endpoint, "remote extraction request");

    let mut request = Client::new()
        .post(&config.endpoint)
        .header("content-type", "application/json")
        .json(&payload);

    if let Some(api_key) = &config.api_key {
        request = request.bearer_auth(api_key);
    }

    let response = request.send()?;

    if !response.status().is_success() {
        return Err(IngestError::RemoteEngine(format!(
            "request to {} returned {}",
            config.endpoint,
            response.status()
        )));
    }

    let payload: RemoteExtractResponse = response.json()?;
    payload_to_pages(&payload, path)
}

fn payload_to_pages(
    payload: &RemoteExtractResponse,
    path: &Path,
) -> Result<Vec<PageText>, IngestError> {
    if let Some(listed) = &payload.pages {
        let mut pages = listed
            .iter()
            .enumerate()
            .map(|(index, page)| PageText {
                number: page.page.unwrap_or(index as u32 + 1),
                text: page
                    .text
                    .as_deref()
                    .map(join_text_items)
                    .unwrap_or_default(),
            })
            .collect::<Vec<_>>();
        pages.sort_by_key(|page| page.number);

        if pages.first().is_some_and(|page| page.number == 0) {
            return Err(IngestError::RemoteEngine(format!(
                "response numbered a page 0 for {}",
                path.display()
            )));
        }
        if let Some(pair) = pages.windows(2).find(|pair| pair[0].number == pair[1].number) {
            return Err(IngestError::RemoteEngine(format!(
                "response repeated page {} for {}",
                pair[0].number,
                path.display()
            )));
        }

        if pages.iter().any(|page| !page.text.is_empty()) {
            return Ok(pages);
        }
    }

    if let Some(raw_text) = &payload.text {
        let pages = raw_text
            .split('\u{000c}')
            .enumerate()
            .map(|(index, page)| PageText {
                number: index as u32 + 1,
                text: join_text_items(page),
            })
            .collect::<Vec<_>>();

        if pages.iter().any(|page| !page.text.is_empty()) {
            return Ok(pages);
        }
    }

    Err(IngestError::RemoteEngine(format!(
        "response had no readable text for {}",
        path.display()
    )))
}
