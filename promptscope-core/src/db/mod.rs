//! Database layer for promptscope
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - Repository pattern for queries
//! - Actor-scoped visibility applied before any caller filter

pub mod repo;
pub mod schema;

pub use repo::{
    Database, DashboardFilter, EventFilter, FeedbackFilter, ProjectFilter, PromptFilter,
    ResponseFilter, SessionFilter, TagFilter, WidgetFilter,
};
