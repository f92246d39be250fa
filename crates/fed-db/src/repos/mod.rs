//! Repository modules implementing persistence for all federation entities.
//!
//! Each module adds methods to `FedService` via `impl FedService` blocks.

pub mod dispatch;
pub mod query;
pub mod result;
pub mod site;
