//! Infrastructure implementations.
//!
//! Contains port trait implementations for external dependencies.

pub mod cache;
pub mod clock;
pub mod config;
pub mod fal;
pub mod folders;
pub mod media;
pub mod ports;
pub mod sse;
pub mod weights;
