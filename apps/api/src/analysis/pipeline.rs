//! Upload → poll → generate, for one stored video.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::analysis::poller::wait_for_terminal_state;
use crate::analysis::prompts::{INTERVIEW_FEEDBACK_PROMPT, VIDEO_DISPLAY_NAME};
use crate::analysis::session::AnalysisPhase;
use crate::errors::AppError;
use crate::llm_client::MediaModel;
use crate::models::video::{FileState, RemoteFile, StoredVideo};

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub remote_file: RemoteFile,
    pub polls: u32,
    /// Model output, exactly as returned.
    pub feedback: String,
}

/// Runs the full remote analysis for `video`, reporting each phase change.
///
/// Generation happens at most once, and never when remote processing ends in
/// `FAILED`. The terminal phase (completed / failed / cancelled) is left to the
/// caller, which decides it from the returned result.
pub async fn analyze_video(
    model: &dyn MediaModel,
    video: &StoredVideo,
    poll_interval: Duration,
    cancel: &CancellationToken,
    mut report: impl FnMut(AnalysisPhase),
) -> Result<AnalysisOutcome, AppError> {
    report(AnalysisPhase::Ingesting);
    info!(
        "Uploading {} for session {}",
        video.file_name, video.session_id
    );
    let file = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(AppError::Cancelled),
        file = model.upload_file(&video.local_path, VIDEO_DISPLAY_NAME, video.format.mime_type()) => file?,
    };

    report(AnalysisPhase::Processing { polls: 0 });
    let outcome = wait_for_terminal_state(model, file, poll_interval, cancel, |polls| {
        report(AnalysisPhase::Processing { polls })
    })
    .await?;

    if outcome.file.state == FileState::Failed {
        return Err(AppError::ProcessingFailed(outcome.file.name));
    }
    info!(
        "{} processed after {} polls; generating feedback",
        outcome.file.name, outcome.polls
    );

    report(AnalysisPhase::Generating);
    let feedback = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(AppError::Cancelled),
        text = model.generate(INTERVIEW_FEEDBACK_PROMPT, &outcome.file) => text?,
    };

    Ok(AnalysisOutcome {
        remote_file: outcome.file,
        polls: outcome.polls,
        feedback,
    })
}

/// The phase a finished analysis leaves its session in.
pub fn final_phase(result: &Result<AnalysisOutcome, AppError>) -> AnalysisPhase {
    match result {
        Ok(_) => AnalysisPhase::Completed,
        Err(AppError::Cancelled) => AnalysisPhase::Cancelled,
        Err(AppError::ProcessingFailed(_)) => AnalysisPhase::Failed {
            reason: "Video processing failed. Please try again.".to_string(),
        },
        Err(_) => AnalysisPhase::Failed {
            reason: "An AI processing error occurred".to_string(),
        },
    }
}
