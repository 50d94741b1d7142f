//! Error taxonomy for the request engine
//!
//! Every domain failure is recoverable from the caller's side: bad input,
//! missing capability, a transition attempted too late, or a race lost to a
//! concurrent actor. Only storage and codec failures are infrastructure.

use crate::money::Money;
use crate::request::RequestStatus;

pub type ServiceResult<T> = Result<T, RequestError>;

/// Input problems caught before anything is written. The offending entity is
/// always named so the caller can point at the right line item or field.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("a request must contain at least one line item")]
    EmptyLineSet,
    #[error("quantity for item {item_id} must be greater than zero")]
    NonPositiveQuantity { item_id: String },
    #[error("unknown item reference: {item_id}")]
    UnknownItem { item_id: String },
    #[error("unknown employee reference: {employee_id}")]
    UnknownEmployee { employee_id: String },
    #[error("unknown role reference: {role_id}")]
    UnknownRole { role_id: String },
    #[error("unknown category reference: {category_id}")]
    UnknownCategory { category_id: String },
    #[error("employee {employee_id} is inactive")]
    InactiveEmployee { employee_id: String },
    #[error("chosen superior {employee_id} holds no approval capability")]
    SuperiorCannotApprove { employee_id: String },
    #[error("employee {employee_id} cannot be their own superior")]
    SelfSuperior { employee_id: String },
    #[error("assignment would create a reporting cycle through {id}")]
    HierarchyCycle { id: String },
    #[error("employee {employee_id} still has requests or notifications; reassign or remove them first")]
    EmployeeHasRecords { employee_id: String },
    #[error("request total exceeds the monthly budget; remaining {remaining}")]
    BudgetExceeded { remaining: Money },
}

#[derive(thiserror::Error, Debug)]
pub enum RequestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("actor {actor_id} is not permitted to {action}")]
    Forbidden {
        actor_id: String,
        action: &'static str,
    },

    #[error("request {request_id} is {status:?}; no transition out of a terminal state")]
    InvalidState {
        request_id: String,
        status: RequestStatus,
    },

    #[error("insufficient stock for item {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: String,
        requested: u32,
        available: i64,
    },

    #[error("request {request_id} was concurrently modified; current status {status:?}")]
    Conflict {
        request_id: String,
        status: RequestStatus,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),

    #[error("codec failure: {0}")]
    Codec(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RequestError {
    pub(crate) fn internal(err: impl std::fmt::Display) -> Self {
        RequestError::Internal(err.to_string())
    }

    /// Domain errors leave no state behind and the caller may retry after
    /// fixing the input; infrastructure errors are not theirs to fix.
    pub fn is_domain(&self) -> bool {
        !matches!(
            self,
            RequestError::Storage(_) | RequestError::Codec(_) | RequestError::Internal(_)
        )
    }
}

pub(crate) fn to_cbor<T: minicbor::Encode<()>>(value: &T) -> ServiceResult<Vec<u8>> {
    minicbor::to_vec(value).map_err(|e| RequestError::Codec(e.to_string()))
}

pub(crate) fn from_cbor<T: for<'b> minicbor::Decode<'b, ()>>(bytes: &[u8]) -> ServiceResult<T> {
    minicbor::decode(bytes).map_err(|e| RequestError::Codec(e.to_string()))
}
