//! OCR fallback for PDF pages that carry no native text layer.
//!
//! OCR is optional: a [`PdfReader`](crate::extractor::PdfReader) without an
//! engine simply drops image-only pages.

use crate::error::IngestError;
use crate::extractor::PageText;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

pub trait OcrEngine: Send + Sync {
    /// Recognizes text for the requested 1-based `pages` of `pdf`.
    /// Pages the engine cannot read are omitted from the result.
    fn recognize(
        &self,
        source_name: &str,
        pdf: &[u8],
        pages: &[u32],
    ) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Clone)]
pub struct OcrEndpointConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

impl OcrEndpointConfig {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Option<Self> {
        let endpoint = endpoint.into().trim().to_string();
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

    /// Reads `LLM_OCR_ENDPOINT` and `LLM_OCR_API_KEY`.
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var("LLM_OCR_ENDPOINT").ok()?;
        Self::new(endpoint, std::env::var("LLM_OCR_API_KEY").ok())
    }
}

#[derive(Debug, Clone, Serialize)]
struct LlmOcrRequest<'a> {
    pdf_base64: String,
    source_path: &'a str,
    pages: &'a [u32],
}

#[derive(Debug, Clone, Deserialize)]
struct LlmOcrResponse {
    pages: Option<Vec<LlmOcrPage>>,
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct LlmOcrPage {
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    text: Option<String>,
}

/// Multimodal OCR over HTTP: posts the whole PDF once per document and
/// keeps the text of the pages that were asked for.
///
/// The blocking client is created per call, on the reader's blocking thread,
/// so the engine can be built and dropped inside an async runtime.
pub struct HttpOcrEngine {
    config: OcrEndpointConfig,
}

impl HttpOcrEngine {
    pub fn new(config: OcrEndpointConfig) -> Self {
        Self { config }
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

impl OcrEngine for HttpOcrEngine {
    fn recognize(
        &self,
        source_name: &str,
        pdf: &[u8],
        pages: &[u32],
    ) -> Result<Vec<PageText>, IngestError> {
        if pages.is_empty() {
            return Ok(Vec::new());
        }

        let payload = LlmOcrRequest {
            pdf_base64: STANDARD.encode(pdf),
            source_path: source_name,
            pages,
        };

        let mut request = Client::new()
            .post(&self.config.endpoint)
            .header("content-type", "application/json")
            .json(&payload);

        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send()?;

        if !response.status().is_success() {
            return Err(IngestError::OcrFailed(format!(
                "multimodal OCR request to {} returned {}",
                self.config.endpoint,
                response.status()
            )));
        }

        let payload: LlmOcrResponse = response.json()?;
        let recognized = payload_to_pages(&payload, source_name, pages)?;

        Ok(recognized
            .into_iter()
            .filter(|page| pages.contains(&page.number))
            .collect())
    }
}

/// `requested` numbers the form-feed chunks of a plain-text reply when the
/// endpoint returned exactly one chunk per requested page.
fn payload_to_pages(
    payload: &LlmOcrResponse,
    source_name: &str,
    requested: &[u32],
) -> Result<Vec<PageText>, IngestError> {
    if let Some(listed) = &payload.pages {
        let listed = listed
            .iter()
            .filter_map(|page| {
                let text = page.text.as_ref().map(|value| value.trim().to_string());
                text.and_then(|normalized| {
                    if normalized.is_empty() {
                        None
                    } else {
                        Some(PageText {
                            number: page.page.unwrap_or(1),
                            text: normalized,
                        })
                    }
                })
            })
            .collect::<Vec<_>>();

        if !listed.is_empty() {
            return Ok(listed);
        }
    }

    if let Some(raw_text) = &payload.text {
        let chunks: Vec<&str> = raw_text.split('\u{000c}').collect();
        let one_per_request = chunks.len() == requested.len();
        let pages = chunks
            .iter()
            .enumerate()
            .filter_map(|(index, chunk)| {
                let normalized = chunk.trim().to_string();
                if normalized.is_empty() {
                    return None;
                }
                let number = if one_per_request {
                    requested[index]
                } else {
                    (index + 1) as u32
                };
                Some(PageText {
                    number,
                    text: normalized,
                })
            })
            .collect::<Vec<_>>();

        if !pages.is_empty() {
            return Ok(pages);
        }
    }

    Err(IngestError::OcrFailed(format!(
        "multimodal OCR response was empty for {source_name}"
    )))
}
