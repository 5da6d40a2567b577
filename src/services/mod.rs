// src/services/mod.rs
//! Passport business logic and the HTTP API.

pub mod api_server;
pub mod passport_assembler;
pub mod visa_factory;
pub mod visa_verifier;
