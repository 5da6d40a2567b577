// src/models/mod.rs
//! Data structures shared across the passport pipeline.

pub mod attribute;
pub mod jwk;
pub mod visa;
