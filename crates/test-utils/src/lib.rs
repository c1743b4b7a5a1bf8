//! Shared test utilities for the wave EDR workspace.
//!
//! - [`generators`]: synthetic wave grids whose values encode their own
//!   indices, so a test can predict any cell with [`cell_value`]
//! - [`fixtures`]: standard grids and registries that publish versions the
//!   way ingestion does
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::*;
pub use generators::*;
