//! # Event Bridge Test Suite
//!
//! Cross-crate tests for the event bridge.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── src/integration/
//! │   ├── fixtures.rs       # Shared hub, collectors, message builders
//! │   ├── e2e_scenarios.rs  # End-to-end flows through a recording bridge
//! │   └── properties.rs     # Subscription, replay and broadcast properties
//! │
//! └── benches/
//!     └── bridge_benchmarks.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p eb-tests
//!
//! # By category
//! cargo test -p eb-tests integration::e2e_scenarios
//! cargo test -p eb-tests integration::properties
//!
//! # Benchmarks
//! cargo bench -p eb-tests
//! ```

pub mod integration;
