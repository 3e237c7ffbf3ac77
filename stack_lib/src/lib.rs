//! Shared core for the stack construct crates.
//!
//! Every construct module in `level2/` receives an [`level0::L0Core`] so it can
//! report configuration errors and publish outputs (logical ids, parameter
//! names) that later modules read back.

pub mod error;
pub mod level0;

pub use error::{Result, StackError};
pub use level0::L0Core;
