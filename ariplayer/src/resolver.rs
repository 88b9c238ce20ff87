//! Metadata-service contract.

use arinode::{AudioSource, Chapter};

use crate::error::Result;

/// Resolves external track ids through the metadata service.
///
/// The player never synthesizes track metadata itself; everything about
/// what an `eid` actually is — where its audio lives, how it is chaptered —
/// comes from here.
#[async_trait::async_trait]
pub trait TrackResolver: Send + Sync {
    /// Resolve an eid to a playable source.
    async fn resolve(&self, eid: &str) -> Result<AudioSource>;

    /// Chapter boundaries within the source, `None` when the track has no
    /// chapter information.
    async fn chapters(&self, eid: &str) -> Result<Option<Vec<Chapter>>>;
}
