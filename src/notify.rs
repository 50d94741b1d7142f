//! Notification records and lifecycle fan-out
//!
//! Fan-out from one lifecycle event: the employee always gets a record, the
//! superior gets one only when present and distinct from the employee
//! (self-notification suppressed). The service persists the whole batch in
//! the same transaction as the triggering transition; a partially delivered
//! fan-out is a defect, not a degraded mode.

use crate::timestamp::TimeStamp;
use crate::utils::{self, hrp};
use chrono::Utc;

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Notification {
    #[n(0)]
    pub notification_id: String,
    #[n(1)]
    pub employee_id: String,
    #[n(2)]
    pub related_request_id: Option<String>,
    #[n(3)]
    pub message: String,
    #[n(4)]
    pub is_read: bool,
    #[n(5)]
    pub created_at: TimeStamp<Utc>,
}

/// Build the notification batch for one event. Never empty: the employee
/// recipient is unconditional.
pub fn fan_out(
    employee_id: &str,
    superior_id: Option<&str>,
    related_request_id: Option<&str>,
    message: &str,
    created_at: TimeStamp<Utc>,
) -> anyhow::Result<Vec<Notification>> {
    let mut recipients = vec![employee_id];
    if let Some(superior) = superior_id
        && !superior.is_empty()
        && superior != employee_id
    {
        recipients.push(superior);
    }

    recipients
        .into_iter()
        .map(|recipient| {
            Ok(Notification {
                notification_id: utils::new_uuid_to_bech32(hrp::NOTIFICATION)?,
                employee_id: recipient.to_string(),
                related_request_id: related_request_id.map(str::to_string),
                message: message.to_string(),
                is_read: false,
                created_at: created_at.clone(),
            })
        })
        .collect()
}
