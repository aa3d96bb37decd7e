//! # promptscope-core
//!
//! Core library for promptscope - a multi-tenant analytics backend for
//! AI assistant interactions.
//!
//! This library provides:
//! - Domain types for projects, sessions, events, prompts, responses,
//!   feedback, tags, dashboards, and widgets
//! - Database storage layer with SQLite
//! - Ownership-based access policy
//! - Windowed project statistics
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Every entity resolves, directly or through its owning event or
//! dashboard, to exactly one project. Read visibility is granted to a
//! project's owner and members; write access only to the owner. All
//! queries go through [`Database`], which applies the visibility
//! restriction before any caller-supplied filter.
//!
//! ## Example
//!
//! ```rust,no_run
//! use promptscope_core::{Config, Database};
//!
//! let config = Config::load().expect("failed to load config");
//! let db = Database::open(&Config::database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use types::*;

// Public modules
pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod policy;
pub mod types;
