// Interview analysis flow: local upload, remote ingestion with status polling,
// and a single feedback generation call.
// All remote calls go through llm_client — no direct Gemini calls here.

pub mod handlers;
pub mod pipeline;
pub mod poller;
pub mod prompts;
pub mod session;
pub mod storage;
