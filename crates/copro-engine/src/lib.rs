//! copro-engine
//!
//! Accounting and charge-distribution services for condominium books.
//! Depends on copro-domain. No CLI, no terminal I/O, no direct storage interactions.

pub mod budget_service;
pub mod context;
pub mod distribution_service;
pub mod error;
pub mod integrity;
pub mod ledger_service;
pub mod public_api;
pub mod reconciliation_service;
pub mod regularization_service;
pub mod reporting;
pub mod shared;
pub mod storage;
pub mod time;
pub mod works_fund_service;

pub use budget_service::*;
pub use context::CallerContext;
pub use distribution_service::*;
pub use error::{CoreError, ErrorKind};
pub use integrity::IntegrityService;
pub use ledger_service::*;
pub use reconciliation_service::*;
pub use regularization_service::*;
pub use reporting::*;
pub use shared::SharedBook;
pub use storage::*;
pub use time::{Clock, FixedClock, SystemClock};
pub use works_fund_service::*;

#[cfg(test)]
mod tests;
