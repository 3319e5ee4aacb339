//! Common types and utilities shared across the crate.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration
//! - Error types
//! - Identifiers (FileId, PageKey)

pub mod config;
pub mod error;
mod file_id;
mod page_key;

pub use config::CacheConfig;
pub use error::{Error, Result};
pub use file_id::FileId;
pub use page_key::PageKey;
