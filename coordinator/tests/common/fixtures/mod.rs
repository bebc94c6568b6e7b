//! Reusable test utilities:
//! - In-memory fleet harness wired into a `StageRunner`
//! - Mock compute API server
//! - Config directory builder

// Each test binary uses a different subset
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod mock_compute;
pub mod test_config;
pub mod test_fleet;

pub use mock_compute::MockComputeApi;
pub use test_config::TestConfigBuilder;
pub use test_fleet::{utc, TestFleet};
