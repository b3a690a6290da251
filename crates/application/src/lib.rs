//! Application services and ports for storefront admission control.

#![forbid(unsafe_code)]

mod admission_ports;
mod admission_service;
mod policy_registry;

pub use admission_ports::{Clock, CounterStore, CounterTick, SystemClock};
pub use admission_service::{
    AdmissionEngine, AdmissionService, AdmissionStats, AdmissionStatsSnapshot,
};
pub use policy_registry::PolicyRegistry;
