use crate::model::StackType;
use thiserror::Error;

/// Fatal errors of a consolidation run
#[derive(Debug, Error)]
pub enum ConsolidationError {
    #[error("no resources could be mapped")]
    NoResources,

    #[error("consolidation cancelled")]
    Cancelled,
}

/// Errors raised by a single merger. Never fatal to the run.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("no resources applicable to the {stack_type} merger")]
    NoMatchingResources { stack_type: StackType },

    #[error("invalid resource {resource}: {reason}")]
    InvalidResource { resource: String, reason: String },

    #[error("failed to render {artifact}: {source}")]
    Render {
        artifact: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("merge cancelled")]
    Cancelled,
}

impl MergeError {
    pub fn invalid(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        MergeError::InvalidResource {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    pub fn render(artifact: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        MergeError::Render {
            artifact: artifact.into(),
            source: source.into(),
        }
    }
}
