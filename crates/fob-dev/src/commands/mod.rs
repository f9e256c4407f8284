//! Command implementations.
//!
//! - [`build`] - one generation, exit code reflects build errors
//! - [`dev`] - watch, rebuild and serve
//!
//! Each module exposes an `execute` function taking the parsed arguments.

pub mod build;
pub mod dev;

pub use build::execute as build_execute;
pub use dev::execute as dev_execute;
