//! Error taxonomy for the release pipeline.
//!
//! Most call sites propagate `anyhow::Result` with context. The variants here
//! name the failure classes that callers and tests need to tell apart; they
//! convert into `anyhow::Error` transparently.

use std::path::PathBuf;
use thiserror::Error;

/// Failure classes of the release pipeline.
#[derive(Debug, Error)]
pub enum ReleaseError {
    /// An architecture token outside the supported set.
    #[error("unsupported architecture '{0}' (expected amd64 or arm64)")]
    UnsupportedArchitecture(String),

    /// A required input was absent from the environment and CLI.
    #[error("missing required input: {0}")]
    MissingInput(&'static str),

    /// An HTTP GET failed after the bounded retry budget.
    #[error("fetch of {url} failed after {attempts} attempt(s): {reason}")]
    Fetch {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// The vendor-page scan found no anchor matching both "runtime" and the
    /// architecture needle.
    #[error("no link on the vendor page matched both \"runtime\" and '{needle}'")]
    AssetNotFound { needle: String },

    /// The scraped asset URL did not answer a metadata request successfully.
    #[error("runtime asset {url} is unreachable (HTTP {status})")]
    AssetUnreachable { url: String, status: u16 },

    /// Neither a regular nor an elevated tool installation succeeded.
    #[error("failed to install {tool}: {reason}")]
    Install { tool: String, reason: String },

    /// The build step reported success but the expected binary is absent.
    #[error("build step succeeded but expected artifact is missing: {}", .0.display())]
    ArtifactMissing(PathBuf),

    /// A container-runner architecture argument outside the supported set.
    #[error("invalid architecture '{0}' (expected amd64, arm64, or nothing for both)")]
    InvalidArchitecture(String),
}
