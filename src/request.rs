//! Request lifecycle types
//!
//! A stationery request is the central transactional entity. It owns its line
//! items outright: edits replace the whole line set, deletes take the lines
//! with them. Each line freezes the item's unit cost at submission time so
//! that historical reports stay accurate when catalog prices move.

use crate::error::{RequestError, ValidationError};
use crate::money::Money;
use crate::timestamp::TimeStamp;
use chrono::Utc;
use std::collections::HashMap;

/// Closed status set. `Pending` is the only state with outgoing transitions;
/// the other three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum RequestStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
    #[n(3)]
    Withdrawn,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }

    /// Pending and Approved requests hold stock reservations; terminal
    /// rejections and withdrawals release theirs.
    pub fn reserves_stock(&self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::Approved)
    }
}

/// One (item, quantity, unit-cost-snapshot) line within a request.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct RequestItem {
    #[n(0)]
    pub item_id: String,
    #[n(1)]
    pub quantity: u32,
    // snapshot of the catalog price at request (or last edit) time
    #[n(2)]
    pub unit_cost: Money,
}

impl RequestItem {
    pub fn line_total(&self) -> Money {
        self.unit_cost * self.quantity
    }
}

/// Exact unrounded sum of the line totals.
pub fn total_of(lines: &[RequestItem]) -> Money {
    lines.iter().map(RequestItem::line_total).sum()
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct StationeryRequest {
    #[n(0)]
    pub request_id: String,
    #[n(1)]
    pub employee_id: String,
    // approver chosen by the requester from the approval route
    #[n(2)]
    pub superior_id: String,
    #[n(3)]
    pub request_date: TimeStamp<Utc>,
    // intended usage window, informational only
    #[n(4)]
    pub from_date: Option<TimeStamp<Utc>>,
    #[n(5)]
    pub to_date: Option<TimeStamp<Utc>>,
    #[n(6)]
    pub status: RequestStatus,
    #[n(7)]
    pub total_cost: Money,
    #[n(8)]
    pub reason: Option<String>,
    #[n(9)]
    pub last_status_changed_at: Option<TimeStamp<Utc>>,
    #[n(10)]
    pub items: Vec<RequestItem>,
}

/// Requested quantity for one item, before price snapshotting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineInput {
    pub item_id: String,
    pub quantity: u32,
}

impl LineInput {
    pub fn new(item_id: &str, quantity: u32) -> Self {
        Self {
            item_id: item_id.to_string(),
            quantity,
        }
    }
}

/// Draft of a new request, built up before submission. Submission validates
/// the shape here and the stock gates in the service.
#[derive(Debug, Clone, Default)]
pub struct RequestDraft {
    pub employee_id: String,
    pub superior_id: String,
    pub lines: Vec<LineInput>,
    pub reason: Option<String>,
    pub from_date: Option<TimeStamp<Utc>>,
    pub to_date: Option<TimeStamp<Utc>>,
}

impl RequestDraft {
    pub fn new(employee_id: &str, superior_id: &str) -> Self {
        Self {
            employee_id: employee_id.to_string(),
            superior_id: superior_id.to_string(),
            ..Default::default()
        }
    }
    pub fn add_line(mut self, item_id: &str, quantity: u32) -> Self {
        self.lines.push(LineInput::new(item_id, quantity));
        self
    }
    pub fn set_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }
    pub fn set_from_date(mut self, date: TimeStamp<Utc>) -> Self {
        self.from_date = Some(date);
        self
    }
    pub fn set_to_date(mut self, date: TimeStamp<Utc>) -> Self {
        self.to_date = Some(date);
        self
    }
}

/// Gate order for create and edit, short-circuiting on the first failure:
///
/// 1. the line set is non-empty
/// 2. every requested quantity is greater than zero
/// 3. every requested quantity fits the item's available stock
///
/// `availability` maps item id to *unclamped* available stock; a missing key
/// means the item is not in the catalog. Nothing is persisted on failure.
pub fn validate_lines(
    lines: &[LineInput],
    availability: &HashMap<String, i64>,
) -> Result<(), RequestError> {
    if lines.is_empty() {
        return Err(ValidationError::EmptyLineSet.into());
    }

    for line in lines {
        if line.quantity == 0 {
            return Err(ValidationError::NonPositiveQuantity {
                item_id: line.item_id.clone(),
            }
            .into());
        }
    }

    for line in lines {
        let available = *availability.get(&line.item_id).ok_or_else(|| {
            ValidationError::UnknownItem {
                item_id: line.item_id.clone(),
            }
        })?;
        if i64::from(line.quantity) > available {
            return Err(RequestError::InsufficientStock {
                item_id: line.item_id.clone(),
                requested: line.quantity,
                available,
            });
        }
    }

    Ok(())
}
