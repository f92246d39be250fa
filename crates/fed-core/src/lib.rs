//! # fed-core
//!
//! Core types shared by every crate of the feasibility federation.
//!
//! This crate provides:
//! - Entity structs for the durable records (queries, contents, dispatches,
//!   sites, results)
//! - Status and type enums (`QueryStatus`, `ResultType`, `BrokerType`,
//!   `MediaType`)
//! - ID prefix constants
//! - Cross-cutting error types
//! - Content hashing for query deduplication
//! - Deterministic per-query tokenization of site names

pub mod entities;
pub mod enums;
pub mod errors;
pub mod hash;
pub mod ids;
pub mod obfuscation;
