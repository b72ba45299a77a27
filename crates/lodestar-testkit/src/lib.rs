//! Lodestar Testing Infrastructure
//!
//! Fault-injecting stand-ins for the two external boundaries plus a fixture
//! that wires a complete engine over them.
//!
//! ```toml
//! [dev-dependencies]
//! lodestar-testkit = { path = "../lodestar-testkit" }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod driver;
pub mod fixtures;
pub mod store;

pub use driver::MemoryDriver;
pub use fixtures::EngineFixture;
pub use store::FlakyStore;
