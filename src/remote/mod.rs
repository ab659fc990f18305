// SPDX-License-Identifier: MPL-2.0

mod client;
mod storage;

pub use client::RemoteClient;
pub use storage::BucketClient;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    /// Transport-level failure (DNS, refused connection, TLS, the
    /// cross-origin class in the hosted setup). Never retried; the
    /// caller falls straight back to the local mirror.
    #[error("network error: {0}")]
    Network(String),
    #[error("remote rejected request: {code} {message}")]
    Status { code: u16, message: String },
    #[error("record not found")]
    NotFound,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Default retry classification: server-side trouble is worth
    /// another attempt, everything else is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Network(_) => false,
            RemoteError::Status { code, .. } => *code >= 500 || *code == 429,
            RemoteError::NotFound => false,
            RemoteError::InvalidResponse(_) => false,
        }
    }
}
