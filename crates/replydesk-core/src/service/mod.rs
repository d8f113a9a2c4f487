//! Request-level sequencing over the store and gateways.

mod orchestrator;

pub use orchestrator::Orchestrator;
