//! LLM Client — the single point of entry for all Gemini API calls.
//!
//! ARCHITECTURAL RULE: No other module may call the Gemini API directly.
//! Callers depend on the `MediaModel` trait so the remote service can be
//! swapped for a scripted double in tests.
//!
//! Model: gemini-1.5-flash (hardcoded — do not make configurable to prevent drift)

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::CONTENT_LENGTH, Body, Client, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::models::video::RemoteFile;

#[cfg(test)]
pub mod scripted;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";
/// The model used for every feedback generation.
pub const MODEL: &str = "gemini-1.5-flash";
const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to read local video: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upload session was not granted an upload URL")]
    MissingUploadUrl,

    #[error("LLM returned empty content")]
    EmptyContent,
}

/// The remote multimodal service, reduced to the three calls the analyzer makes.
#[async_trait]
pub trait MediaModel: Send + Sync {
    /// Submits a local file for ingestion. The returned handle usually starts in
    /// `PROCESSING`.
    async fn upload_file(
        &self,
        path: &Path,
        display_name: &str,
        mime_type: &str,
    ) -> Result<RemoteFile, LlmError>;

    /// Re-queries the state of a previously uploaded file by resource name.
    async fn get_file(&self, name: &str) -> Result<RemoteFile, LlmError>;

    /// Sends `prompt` together with a reference to `file` and returns the text answer.
    async fn generate(&self, prompt: &str, file: &RemoteFile) -> Result<String, LlmError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct UploadStartRequest<'a> {
    file: UploadMetadata<'a>,
}

#[derive(Debug, Serialize)]
struct UploadMetadata<'a> {
    display_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct FileEnvelope {
    file: RemoteFile,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text { text: &'a str },
    File { file_data: FileData<'a> },
}

#[derive(Debug, Serialize)]
struct FileData<'a> {
    mime_type: &'a str,
    file_uri: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
pub struct ResponsePart {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
}

impl GenerateResponse {
    /// Concatenates the text parts of the first candidate, untouched.
    pub fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let texts: Vec<&str> = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.concat())
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

/// Production `MediaModel` backed by the Gemini REST API.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Result<Self, LlmError> {
        // No overall request timeout: video uploads and generation have no ceiling.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, api_key })
    }

    async fn start_upload(
        &self,
        display_name: &str,
        mime_type: &str,
        content_length: u64,
    ) -> Result<String, LlmError> {
        let response = self
            .client
            .post(format!("{GEMINI_API_BASE}/upload/v1beta/files"))
            .header("x-goog-api-key", &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header(
                "X-Goog-Upload-Header-Content-Length",
                content_length.to_string(),
            )
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&UploadStartRequest {
                file: UploadMetadata { display_name },
            })
            .send()
            .await?;

        let response = ensure_success(response).await?;

        response
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .ok_or(LlmError::MissingUploadUrl)
    }
}

#[async_trait]
impl MediaModel for GeminiClient {
    async fn upload_file(
        &self,
        path: &Path,
        display_name: &str,
        mime_type: &str,
    ) -> Result<RemoteFile, LlmError> {
        let file = tokio::fs::File::open(path).await?;
        let content_length = file.metadata().await?.len();
        let upload_url = self
            .start_upload(display_name, mime_type, content_length)
            .await?;

        // Streamed from disk; the video is never held in memory as a whole.
        let response = self
            .client
            .post(upload_url)
            .header(CONTENT_LENGTH, content_length)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?;

        let envelope: FileEnvelope = ensure_success(response).await?.json().await?;
        debug!(
            "Uploaded {} as {} (state {:?})",
            path.display(),
            envelope.file.name,
            envelope.file.state
        );
        Ok(envelope.file)
    }

    async fn get_file(&self, name: &str) -> Result<RemoteFile, LlmError> {
        let response = self
            .client
            .get(format!("{GEMINI_API_BASE}/v1beta/{name}"))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;

        Ok(ensure_success(response).await?.json().await?)
    }

    async fn generate(&self, prompt: &str, file: &RemoteFile) -> Result<String, LlmError> {
        let mime_type = file.mime_type.as_deref().unwrap_or("video/mp4");
        let request_body = GenerateRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![
                    RequestPart::Text { text: prompt },
                    RequestPart::File {
                        file_data: FileData {
                            mime_type,
                            file_uri: &file.uri,
                        },
                    },
                ],
            }],
        };

        let response = self
            .client
            .post(format!(
                "{GEMINI_API_BASE}/v1beta/models/{MODEL}:generateContent"
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let body: GenerateResponse = ensure_success(response).await?.json().await?;

        if let Some(usage) = &body.usage_metadata {
            debug!(
                "Gemini call succeeded: prompt_tokens={}, output_tokens={}",
                usage.prompt_token_count, usage.candidates_token_count
            );
        }

        body.text().ok_or(LlmError::EmptyContent)
    }
}

/// Turns a non-2xx response into `LlmError::Api`, preferring the API's own message.
async fn ensure_success(response: Response) -> Result<Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(LlmError::Api {
        status: status.as_u16(),
        message: api_error_message(body),
    })
}

fn api_error_message(body: String) -> String {
    serde_json::from_str::<GeminiError>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body)
}
