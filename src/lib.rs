//! Licensor - multi-brand license entitlement and activation server
//!
//! This library provides the core functionality for the Licensor service:
//! credential generation, tenant-scoped storage, the activation engine,
//! API key authentication, and the HTTP handlers built on top of them.

pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod events;
pub mod extractors;
pub mod handlers;
pub mod keygen;
pub mod licensing;
pub mod middleware;
pub mod models;
pub mod rate_limit;
pub mod tenancy;
pub mod util;
