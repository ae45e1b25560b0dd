use thiserror::Error;

use shelfmatch_catalog::CatalogError;
use shelfmatch_db::DbError;
use shelfmatch_vision::VisionError;

/// Per-item failure taxonomy. Every variant is caught at the item boundary
/// inside the batch orchestrator and recorded as that item's terminal
/// outcome; none aborts sibling items or the batch.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("candidate search failed: {0}")]
    Search(#[source] CatalogError),

    #[error("visual classification failed: {0}")]
    Classification(#[source] VisionError),

    #[error("persistence failed: {0}")]
    Persistence(#[from] DbError),

    #[error("rate limited by {service} service (retry after {retry_after_secs}s)")]
    RateLimited {
        service: &'static str,
        retry_after_secs: u64,
    },
}

impl From<CatalogError> for PipelineError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::RateLimited { retry_after_secs } => PipelineError::RateLimited {
                service: "catalog",
                retry_after_secs,
            },
            other => PipelineError::Search(other),
        }
    }
}

impl From<VisionError> for PipelineError {
    fn from(err: VisionError) -> Self {
        match err {
            VisionError::RateLimited { retry_after_secs } => PipelineError::RateLimited {
                service: "vision",
                retry_after_secs,
            },
            other => PipelineError::Classification(other),
        }
    }
}
