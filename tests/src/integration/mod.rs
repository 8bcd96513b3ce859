//! # Integration Tests
//!
//! Several event services wired to one host bridge, the way a host process
//! runs them.

pub mod fixtures;

#[cfg(test)]
mod e2e_scenarios;
#[cfg(test)]
mod properties;
