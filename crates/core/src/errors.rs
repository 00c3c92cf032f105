use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::negotiation::NegotiationStatus;
use crate::domain::quote::QuoteStatus;
use crate::domain::rfq::RfqStatus;
use crate::store::StoreError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid quote transition from {from:?} to {to:?}")]
    InvalidQuoteTransition { from: QuoteStatus, to: QuoteStatus },
    #[error("invalid negotiation transition from {from:?} to {to:?}")]
    InvalidNegotiationTransition { from: NegotiationStatus, to: NegotiationStatus },
    #[error("invalid rfq transition from {from:?} to {to:?}")]
    InvalidRfqTransition { from: RfqStatus, to: RfqStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Rfq,
    Quote,
    Negotiation,
    Product,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Rfq => "rfq",
            Self::Quote => "quote",
            Self::Negotiation => "negotiation",
            Self::Product => "product",
        };
        f.write_str(label)
    }
}

/// Coarse classification callers map onto transport responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Authorization,
    Conflict,
    Validation,
    Expired,
    Infrastructure,
}

/// Error returned by every quote and negotiation operation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: EntityKind, id: String },
    #[error("not authorized: {0}")]
    Authorization(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("expired: {0}")]
    Expired(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Store(StoreError),
}

impl EngineError {
    pub fn not_found(entity: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Authorization(_) => ErrorKind::Authorization,
            Self::Conflict(_) | Self::Domain(_) => ErrorKind::Conflict,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Expired(_) => ErrorKind::Expired,
            Self::Store(_) => ErrorKind::Infrastructure,
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Gone { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::PreconditionFailed(message) => Self::Conflict(message),
            other => Self::Store(other),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("gone: {message}")]
    Gone { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::Forbidden { .. } => "You are not allowed to act on this record.",
            Self::Conflict { .. } => {
                "The record changed state before your request was applied. Refresh and try again."
            }
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Gone { .. } => "This offer is no longer valid.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl From<EngineError> for InterfaceError {
    fn from(value: EngineError) -> Self {
        let correlation_id = "unassigned".to_owned();
        let message = value.to_string();
        match value {
            EngineError::NotFound { .. } => Self::NotFound { message, correlation_id },
            EngineError::Authorization(_) => Self::Forbidden { message, correlation_id },
            EngineError::Conflict(_) | EngineError::Domain(_) => {
                Self::Conflict { message, correlation_id }
            }
            EngineError::Validation(_) => Self::BadRequest { message, correlation_id },
            EngineError::Expired(_) => Self::Gone { message, correlation_id },
            EngineError::Store(StoreError::Decode(_)) => Self::Internal { message, correlation_id },
            EngineError::Store(_) => Self::ServiceUnavailable { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{DomainError, EngineError, EntityKind, ErrorKind, InterfaceError};
    use crate::store::StoreError;

    #[test]
    fn precondition_failure_surfaces_as_conflict() {
        let error = EngineError::from(StoreError::PreconditionFailed(
            "quote Q-1 is no longer pending".to_owned(),
        ));

        assert_eq!(error.kind(), ErrorKind::Conflict);
        assert!(error.to_string().contains("no longer pending"));
    }

    #[test]
    fn backend_failure_is_propagated_unmodified() {
        let error = EngineError::from(StoreError::Backend("database is locked".to_owned()));

        assert_eq!(error, EngineError::Store(StoreError::Backend("database is locked".to_owned())));
        assert_eq!(error.kind(), ErrorKind::Infrastructure);
    }

    #[test]
    fn not_found_maps_to_not_found_interface_error() {
        let interface = EngineError::not_found(EntityKind::Quote, "Q-404").into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::NotFound { ref correlation_id, ref message }
                if correlation_id == "req-1" && message.contains("Q-404")
        ));
    }

    #[test]
    fn expired_offer_maps_to_gone_with_user_safe_message() {
        let interface =
            EngineError::Expired("counter offer N-1 lapsed".to_owned()).into_interface("req-2");

        assert!(matches!(interface, InterfaceError::Gone { .. }));
        assert_eq!(interface.user_message(), "This offer is no longer valid.");
    }

    #[test]
    fn domain_transition_errors_classify_as_conflicts() {
        let error = EngineError::from(DomainError::InvariantViolation("two winners".to_owned()));
        assert_eq!(error.kind(), ErrorKind::Conflict);

        let interface = error.into_interface("req-3");
        assert!(matches!(interface, InterfaceError::Conflict { .. }));
    }

    #[test]
    fn authorization_maps_to_forbidden() {
        let interface = EngineError::Authorization("buyer-2 does not own rfq".to_owned())
            .into_interface("req-4");
        assert!(matches!(interface, InterfaceError::Forbidden { .. }));
    }
}
