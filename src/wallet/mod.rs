// src/wallet/mod.rs
//! Local key material: keystore loading and the JWT signing service.

pub mod key_management;
pub mod key_store;
