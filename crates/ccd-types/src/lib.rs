//! Shared domain types for the CCD dashboard.

pub mod api;
pub mod config;
pub mod events;
pub mod geometry;
pub mod status;
pub mod view;

mod errors;

pub use errors::{CcdError, Result};
