//! Domain entities and invariants for storefront admission control.

#![forbid(unsafe_code)]

mod admission;
mod identity;
mod policy;

pub use admission::AdmissionDecision;
pub use identity::{ClientOrigin, IdentityKey, UNKNOWN_IDENTITY};
pub use policy::{DEFAULT_POLICY_TABLE, Policy, default_policies};
