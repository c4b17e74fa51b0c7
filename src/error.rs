//! Crate error type.
//!
//! Parsing, cascade and layout never fail; only the edges that touch the
//! outside world (fetching, font bytes, configuration files) return errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The fetch collaborator could not produce a body for `url`.
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("failed to parse font '{family}': {reason}")]
    FontParse { family: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
