// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types.
//!
//! Two distinct families:
//! - [`SyncError`] is returned at the call site for programming errors
//!   (bad configuration, invalid arguments, use after shutdown).
//! - [`UploadError`] comes back from the uploader. It never escapes a
//!   background flush; the engine flattens its cause chain into a
//!   [`crate::SyncEvent::RoundFailed`] notification instead.
//!
//! Administrative outcomes (feature disabled, filtered out, empty batch) are
//! not errors at all, see [`crate::EnqueueResult`].

use std::error::Error as StdError;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Sync engine has been shut down")]
    ShutDown,
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Backend rejected the batch: {0}")]
    Rejected(String),
    #[error("Transport failure: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    },
    #[error("Upload timed out after {0:?}")]
    Timeout(Duration),
}

impl UploadError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    pub fn transport_with(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// This error followed by every nested source, outermost first.
    #[must_use]
    pub fn causes(&self) -> Vec<String> {
        let mut chain = vec![self.to_string()];
        let mut current = self.source();
        while let Some(cause) = current {
            chain.push(cause.to_string());
            current = cause.source();
        }
        chain
    }

    /// Innermost error of the chain.
    #[must_use]
    pub fn root_cause(&self) -> &(dyn StdError + 'static) {
        let mut current: &(dyn StdError + 'static) = self;
        while let Some(next) = current.source() {
            current = next;
        }
        current
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rejected(_) => "rejected",
            Self::Transport { .. } => "transport",
            Self::Timeout(_) => "timeout",
        }
    }
}
