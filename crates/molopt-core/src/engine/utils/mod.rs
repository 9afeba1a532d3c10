//! Utility functions for the engine module.
//!
//! Random draws and order statistics shared by population sampling and prompt rendering.

pub mod sampling;
