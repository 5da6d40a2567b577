// src/remote/mod.rs
//! Clients for third-party services: claim repositories and trust anchors.

pub mod claim_repository;
pub mod trust_anchor;
