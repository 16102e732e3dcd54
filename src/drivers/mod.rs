//! Device drivers
//!
//! All drivers follow these principles:
//! - Minimal unsafe code, well-documented
//! - Hardware is reached only through the `hal` traits
//! - No panics on invalid input (return errors)

pub mod i915;
