//! Engine-level error taxonomy.

use tempograph_core::{EntityId, EpisodeId};
use tempograph_extraction::ProviderError;

/// Failures an engine operation can surface to its caller.
///
/// Provider failures during ingestion are deliberately NOT here: an episode
/// whose extraction failed is still ingested, and the failure is reported as
/// a warning on the response. Community-build rejections are not here
/// either: an in-progress or under-threshold build is a status on
/// `BuildOutcome`, not a failure. Only failures that prevent the operation
/// entirely become errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The request carried no tenant partition id in any accepted position.
    /// Rejected before any store access.
    #[error("request carries no tenant partition id")]
    MissingTenant,

    #[error("episode {0} not found")]
    EpisodeNotFound(EpisodeId),

    #[error("entity {0} not found")]
    EntityNotFound(EntityId),

    /// A provider failure that exhausted its retries in a context with no
    /// degraded path.
    #[error("provider failure: {0}")]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
