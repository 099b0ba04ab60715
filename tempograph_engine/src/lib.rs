//! # Tempograph Engine
//!
//! Orchestration layer of the Tempograph temporal knowledge graph. The
//! [`Engine`] wires the bi-temporal store to the extraction and embedding
//! capabilities and exposes the three top-level flows:
//!
//! - **Ingestion** — persist the episode, extract candidates, resolve
//!   entities, write facts with idempotency and supersession. The episode is
//!   stored before extraction runs, so provider failures never lose data.
//! - **Search** — strategy selection, optional query enhancement, hybrid
//!   ranking, and a transformation record explaining every decision.
//! - **Community building** — batch Leiden clustering per partition with an
//!   in-flight guard and wholesale replacement of the previous community
//!   set.

pub mod community;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod search;
pub mod types;

pub use engine::Engine;
pub use error::EngineError;
pub use types::{
    BuildOutcome, CommunityBuildReport, CustomerContext, IngestRequest, IngestResponse,
    SearchRequest, SearchResponse, SearchResult, TenantContext,
};

/// Initialize tracing from the `RUST_LOG` environment variable, defaulting
/// to `info`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
