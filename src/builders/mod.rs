//! Builders that turn configuration into schedulers.

pub mod session_builder;

pub use session_builder::{build_admission_controller, build_scheduler, Stage};
