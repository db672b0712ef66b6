//! # naas-persistence
//!
//! The Incident Persistor (spec §4.5): idempotent upsert of enriched
//! incidents into the columnar store's `incidents` table plus an
//! append-only timeline of status transitions.

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod service;

pub use service::IncidentPersistor;
