use std::path::PathBuf;
use thiserror::Error;

/// Result type for taxonomy operations
pub type Result<T> = std::result::Result<T, TaxonomyError>;

/// Errors raised while building a [`crate::TaxonomyIndex`].
///
/// All of them are construction errors: the caller is expected to abort startup.
#[derive(Error, Debug)]
pub enum TaxonomyError {
    /// The taxonomy file does not exist
    #[error("Taxonomy file not found: {}", path.display())]
    Missing { path: PathBuf },

    /// Nothing but the header (or nothing at all) was found
    #[error("Taxonomy is empty: no category paths after the header line")]
    Empty,

    /// IO error occurred while reading the file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
