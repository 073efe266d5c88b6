use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AssemblyError {
    #[error("invalid GenBank accession: {0}")]
    #[diagnostic(help("expected letters, digits and a version suffix, e.g. AJ312413.2"))]
    InvalidAccession(String),

    #[error("invalid assembly accession: {0}")]
    #[diagnostic(help("expected GCA_/GCF_ followed by nine digits and a version"))]
    InvalidAssemblyAccession(String),

    #[error("malformed assembly report {path}: {message}")]
    Format { path: String, message: String },

    #[error("asset not found upstream: {0}")]
    MissingAsset(String),

    #[error("missing config file assembly-fetch.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("NCBI request failed: {0}")]
    NcbiHttp(String),

    #[error("NCBI returned status {status}: {message}")]
    NcbiStatus { status: u16, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl AssemblyError {
    pub(crate) fn format(path: impl Into<String>, message: impl Into<String>) -> Self {
        AssemblyError::Format {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Remote failures that survived the retry budget.
    pub fn is_transient_fetch(&self) -> bool {
        matches!(
            self,
            AssemblyError::NcbiHttp(_) | AssemblyError::NcbiStatus { .. }
        )
    }
}
