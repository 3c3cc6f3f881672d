use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Container formats accepted by the upload endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    Mp4,
    Mov,
    Avi,
}

impl VideoFormat {
    /// Resolves the format from a file name's extension, ignoring case.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let (_, ext) = file_name.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "mp4" => Some(VideoFormat::Mp4),
            "mov" => Some(VideoFormat::Mov),
            "avi" => Some(VideoFormat::Avi),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "mp4",
            VideoFormat::Mov => "mov",
            VideoFormat::Avi => "avi",
        }
    }

    /// MIME type announced to the remote file service.
    pub fn mime_type(self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "video/mp4",
            VideoFormat::Mov => "video/quicktime",
            VideoFormat::Avi => "video/x-msvideo",
        }
    }
}

/// The local half of an uploaded video reference.
#[derive(Debug, Clone, Serialize)]
pub struct StoredVideo {
    pub session_id: Uuid,
    #[serde(skip)]
    pub local_path: PathBuf,
    pub file_name: String,
    pub format: VideoFormat,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// Processing state reported by the remote file service.
///
/// Anything other than `Processing` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", from = "String")]
pub enum FileState {
    Processing,
    Active,
    Failed,
    StateUnspecified,
}

impl From<String> for FileState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "PROCESSING" => FileState::Processing,
            "ACTIVE" => FileState::Active,
            "FAILED" => FileState::Failed,
            _ => FileState::StateUnspecified,
        }
    }
}

impl FileState {
    pub fn is_terminal(self) -> bool {
        self != FileState::Processing
    }
}

/// The remote half of an uploaded video reference: an opaque handle plus state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    /// Resource name, e.g. `files/abc123`. Used to re-query state.
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub uri: String,
    #[serde(default = "unspecified")]
    pub state: FileState,
}

fn unspecified() -> FileState {
    FileState::StateUnspecified
}
