//! Error types for Bazelisk
//!
//! All modules use `BazeliskResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Bazelisk operations
pub type BazeliskResult<T> = Result<T, BazeliskError>;

/// All errors that can occur while resolving, fetching or launching Bazel
#[derive(Error, Debug)]
pub enum BazeliskError {
    // Parse errors
    #[error("invalid version \"{input}\": {reason}")]
    Parse { input: String, reason: String },

    // Resolution errors
    #[error("{0}")]
    Unsupported(String),

    #[error("cannot resolve version \"{label}\": there are only {available} Bazel versions")]
    NotEnoughVersions { label: String, available: usize },

    #[error("{0}")]
    Resolution(String),

    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    // Network errors
    #[error("HTTP GET {url} failed with status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("HTTP GET {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("could not parse {what}: {source}")]
    InvalidJson {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    // Filesystem errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("SHA256 mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    // Launch errors
    #[error("could not start {program}")]
    Launch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<BazeliskError>,
    },
}

impl BazeliskError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a specifier parse error
    pub fn parse(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Create a resolution error
    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::Resolution(msg.into())
    }

    /// Create a JSON decoding error
    pub fn invalid_json(what: impl Into<String>, source: serde_json::Error) -> Self {
        Self::InvalidJson {
            what: what.into(),
            source,
        }
    }

    /// Prefix the error with what was being attempted
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Context { source, .. } => source.hint(),
            Self::HttpStatus { url, status: 403 | 429 } if url.contains("api.github.com") => {
                Some("GitHub rate limit reached. Set BAZELISK_GITHUB_TOKEN to authenticate")
            }
            Self::ChecksumMismatch { .. } => {
                Some("Check BAZELISK_VERIFY_SHA256 or the download URL")
            }
            Self::UnsupportedPlatform(_) => {
                Some("Point USE_BAZEL_VERSION at a local binary built for this platform")
            }
            _ => None,
        }
    }
}
