//! Admission decisions: a fixed window counter with a penalty box.
//!
//! All mutable state lives in the shared [`CounterStore`](crate::CounterStore),
//! so any number of service instances enforce one logical quota per
//! `(policy, identity)` pair.

mod engine;
mod service;
mod stats;

#[cfg(test)]
mod tests;

pub use engine::AdmissionEngine;
pub use service::AdmissionService;
pub use stats::{AdmissionStats, AdmissionStatsSnapshot};
