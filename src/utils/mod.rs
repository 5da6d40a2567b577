// src/utils/mod.rs
//! Helper functions.

pub mod serialization;
pub mod time;
