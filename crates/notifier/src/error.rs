use thiserror::Error;

/// Longest response body kept in an error description.
const MAX_BODY_CHARS: usize = 512;

/// Why a webhook attempt did not count as delivered.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("client setup failed: {0}")]
    Client(String),
}

impl DeliveryError {
    pub(crate) fn rejected(status: u16, body: &str) -> Self {
        DeliveryError::Rejected {
            status,
            body: truncate(body),
        }
    }
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(MAX_BODY_CHARS) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
