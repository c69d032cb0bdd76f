//! copro-domain
//!
//! Pure domain models for condominium accounting (accounts, journals, ledger lines,
//! distribution keys, budgets, regularizations, bank feeds, works fund).
//! No I/O, no CLI, no storage. Only data types, invariants local to one value, and enums.

pub mod account;
pub mod bank;
pub mod book;
pub mod budget;
pub mod common;
pub mod directory;
pub mod distribution;
pub mod journal;
pub mod ledger_line;
pub mod money;
pub mod regularization;
pub mod report;
pub mod works_fund;

pub use account::*;
pub use bank::*;
pub use book::*;
pub use budget::*;
pub use common::*;
pub use directory::*;
pub use distribution::*;
pub use journal::*;
pub use ledger_line::*;
pub use money::*;
pub use regularization::*;
pub use report::*;
pub use works_fund::*;
