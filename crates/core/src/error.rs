//! Error types for pagehnsw
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Only hard failures live here. Two conditions are deliberately absent:
//! a neighbor tuple whose slot count disagrees with its element's level is
//! decoded as an empty neighbor list, and running out of build memory
//! switches the build to page-level insertion.

use crate::types::PageId;
use std::io;
use thiserror::Error;

/// Result type alias for pagehnsw operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for pagehnsw
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (page file operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid index parameters (dimension, m, ef_construction, columns)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A row or query does not match the index definition
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Vector dimension doesn't match the index dimension
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Dimension recorded for the index
        expected: usize,
        /// Dimension of the offending vector
        got: usize,
    },

    /// Serialized element does not fit on an empty page
    #[error("Element tuple too large: {size} bytes (max {max})")]
    ElementTooLarge {
        /// Encoded size in bytes
        size: usize,
        /// Largest tuple a page can hold
        max: usize,
    },

    /// A page has no room for the requested item
    #[error("Page {page} has no room for {needed} bytes")]
    PageFull {
        /// Page that was targeted
        page: PageId,
        /// Bytes that were requested
        needed: usize,
    },

    /// Data corruption detected (bad magic, checksum, missing item)
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// The operation observed a cancellation request at a checkpoint
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Shorthand for [`Error::InvalidConfig`]
    pub fn config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }

    /// Shorthand for [`Error::InvalidInput`]
    pub fn input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Shorthand for [`Error::Corruption`]
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// True for the configuration class of errors, which are raised before
    /// any page is written.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}
