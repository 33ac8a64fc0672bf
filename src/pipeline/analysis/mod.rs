pub mod client;
pub mod parser;

pub use client::*;
pub use parser::*;

use thiserror::Error;

use crate::credentials::ApiKey;
use crate::models::PatchOp;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed analysis response: {0}")]
    MalformedResponse(String),
}

impl AnalysisError {
    /// Message suitable for showing to the person who triggered the pass.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Auth(_) => "The analysis service rejected the API key. Check the key and try again.",
            Self::Transport(_) => "The analysis service could not be reached. Please try again.",
            Self::MalformedResponse(_) => {
                "The analysis service returned a reply that could not be understood. Please try again."
            }
        }
    }
}

/// One request/response exchange with the oracle, parsed into patch ops.
/// Exactly one outbound request; no caching, no retry.
pub fn analyze(
    client: &dyn ChatClient,
    request: &ChatRequest,
    credentials: &ApiKey,
) -> Result<Vec<PatchOp>, AnalysisError> {
    let reply = request_reply(client, request, credentials)?;
    let ops = parse_patch_response(&reply)?;
    tracing::debug!(ops = ops.len(), "Analysis reply parsed");
    Ok(ops)
}

/// Send the request and return the raw reply, unparsed.
pub fn request_reply(
    client: &dyn ChatClient,
    request: &ChatRequest,
    credentials: &ApiKey,
) -> Result<String, AnalysisError> {
    if credentials.is_blank() {
        return Err(AnalysisError::Auth("API key is missing".into()));
    }
    client.complete(request, credentials)
}
