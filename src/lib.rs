// ============================================================================
// docstore_repository
// ============================================================================
//
// Generic repository for storing domain aggregates in a document store:
// - persistence: contracts, store backends and the repository itself
// - domain:      sample aggregates stored through the repository
// - config:      environment-driven store configuration
// - metrics:     Prometheus metrics shared by repositories
//
// ============================================================================

#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

pub mod config;
pub mod domain;
pub mod metrics;
pub mod persistence;
pub mod utils;
