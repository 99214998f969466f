//! Infrastructure layer module
//!
//! This module contains the adapters and ambient plumbing of the engine:
//! - REST backend client (reqwest)
//! - Push transports
//! - Configuration management
//! - Logging infrastructure
//!
//! Infrastructure implementations satisfy the port traits defined in the domain layer.

pub mod backend;
pub mod config;
pub mod logging;
pub mod push;
