//! Content catalog access for Flashnotes.
//!
//! Lists the most recent items of a channel and decides which of them
//! follow the naming convention worth summarizing.

pub mod filter;
pub mod youtube;

use async_trait::async_trait;

use flashnotes_shared::{CatalogItem, Result};

pub use filter::TitleFilter;
pub use youtube::YouTubeCatalog;

/// A listing of recent items, newest first.
///
/// Errors are fatal to the run: [`FlashnotesError::SourceUnauthorized`]
/// when credentials are rejected, [`FlashnotesError::SourceUnavailable`]
/// for anything else.
///
/// [`FlashnotesError::SourceUnauthorized`]: flashnotes_shared::FlashnotesError::SourceUnauthorized
/// [`FlashnotesError::SourceUnavailable`]: flashnotes_shared::FlashnotesError::SourceUnavailable
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn list_recent(&self) -> Result<Vec<CatalogItem>>;
}
