//! Office stationery request management: catalog and stock ledger, employee
//! directory with role thresholds, the request approval state machine,
//! notification fan-out, and spend reporting.

pub mod catalog;
pub mod config;
pub mod directory;
pub mod eligibility;
pub mod error;
pub mod money;
pub mod notify;
pub mod report;
pub mod request;
pub mod service;
pub mod timestamp;
pub mod utils;
