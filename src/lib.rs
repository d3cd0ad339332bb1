//! Account Admin
//!
//! Lifecycle management for system user accounts:
//! - Validated creation with live uniqueness of account, email and mobile
//! - Partial updates, status changes and password resets
//! - Soft deletion (single and batch) with per-item reporting
//! - Filtered listing and registration statistics
//!
//! Storage is pluggable behind [`domain::UserRepository`], with in-memory and
//! PostgreSQL implementations.

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
