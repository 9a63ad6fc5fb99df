//! Core types and trait definitions for the Doorstep canvassing core.
//!
//! This crate is deliberately free of HTTP, database, and geometry-algorithm
//! dependencies. All other crates depend on it; it depends only on plain
//! data-type crates (`geo-types` for the footprint polygon).

pub mod address;
pub mod building;
pub mod error;
pub mod link;
pub mod record;
pub mod stats;
pub mod store;

pub use error::{Error, Result};
