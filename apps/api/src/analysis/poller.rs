//! Remote-processing poller.
//!
//! A freshly uploaded file starts out `PROCESSING`. Its state is re-queried at a
//! fixed interval until it reports anything else. There is no ceiling on the
//! number of polls and the interval never grows; the wait ends early only when
//! the cancellation token fires.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::AppError;
use crate::llm_client::MediaModel;
use crate::models::video::RemoteFile;

#[derive(Debug, Clone)]
pub struct PollOutcome {
    /// The file as last reported, in a terminal state.
    pub file: RemoteFile,
    /// Number of status queries made.
    pub polls: u32,
}

pub async fn wait_for_terminal_state(
    model: &dyn MediaModel,
    mut file: RemoteFile,
    interval: Duration,
    cancel: &CancellationToken,
    mut on_poll: impl FnMut(u32),
) -> Result<PollOutcome, AppError> {
    let mut polls = 0u32;

    while !file.state.is_terminal() {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            _ = tokio::time::sleep(interval) => {}
        }

        polls += 1;
        on_poll(polls);
        file = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            file = model.get_file(&file.name) => file?,
        };
        debug!("Poll {polls} for {}: {:?}", file.name, file.state);
    }

    Ok(PollOutcome { file, polls })
}
