use crate::types::JobId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Unknown job status: {0}")]
    UnknownStatus(String),

    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: JobId },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid transition for job {id}: {from} -> {to}")]
    InvalidTransition {
        id: JobId,
        from: &'static str,
        to: &'static str,
    },
}
