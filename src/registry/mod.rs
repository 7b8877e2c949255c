//! Registry facade
//!
//! Point-in-time and current reads over the registry, isolated from block
//! application.

pub mod facade;

pub use facade::Registry;
