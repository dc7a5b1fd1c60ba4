//! Error types for the service layer

use docseal_anchor::AnchorError;
use docseal_verifier::VerifyError;
use workflow_engine::RegistryError;
use workflow_types::{ErrorKind, WorkflowError};

/// Errors surfaced by [`DocsealService`](crate::DocsealService)
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Anchor(#[from] AnchorError),

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Workflow(e) => e.kind(),
            ServiceError::Anchor(e) => match e {
                AnchorError::NothingToAnchor(_) | AnchorError::AnchorNotFound(_) => {
                    ErrorKind::Validation
                }
                AnchorError::Pending { .. }
                | AnchorError::Unavailable(_)
                | AnchorError::Rejected(_) => ErrorKind::ExternalService,
                AnchorError::Ledger(_) | AnchorError::Store(_) => ErrorKind::Internal,
            },
            ServiceError::Verify(_) => ErrorKind::Internal,
            ServiceError::Registry(RegistryError::NotFound(_)) => ErrorKind::Validation,
            ServiceError::Registry(_) => ErrorKind::ExternalService,
            ServiceError::InvalidRequest(_) => ErrorKind::Validation,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Workflow(e) => e.code(),
            ServiceError::Anchor(AnchorError::NothingToAnchor(_)) => "NOTHING_TO_ANCHOR",
            ServiceError::Anchor(AnchorError::AnchorNotFound(_)) => "ANCHOR_NOT_FOUND",
            ServiceError::Anchor(AnchorError::Pending { .. }) => "ANCHOR_PENDING",
            ServiceError::Anchor(AnchorError::Unavailable(_)) => "ANCHOR_UNAVAILABLE",
            ServiceError::Anchor(AnchorError::Rejected(_)) => "ANCHOR_REJECTED",
            ServiceError::Anchor(_) => "ANCHOR_ERROR",
            ServiceError::Verify(_) => "VERIFY_ERROR",
            ServiceError::Registry(RegistryError::NotFound(_)) => "DOCUMENT_NOT_FOUND",
            ServiceError::Registry(_) => "REGISTRY_ERROR",
            ServiceError::InvalidRequest(_) => "INVALID_REQUEST",
        }
    }

    /// Whether the error means "no such resource" rather than "bad input"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ServiceError::Workflow(WorkflowError::WorkflowNotFound(_))
                | ServiceError::Workflow(WorkflowError::StepNotFound(_))
                | ServiceError::Anchor(AnchorError::AnchorNotFound(_))
                | ServiceError::Registry(RegistryError::NotFound(_))
        )
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
