//! Utility functions for common operations.
//!
//! This module provides reusable utilities for:
//!
//! - **URL normalization**: canonical episode and image URLs (path case preserved)
//! - **URL validation**: Security-focused validation to prevent SSRF attacks
//!
//! # Examples
//!
//! ```
//! use feedcast::util::{normalize_url, validate_url};
//!
//! let url = normalize_url("HTTP://Example.com/Ep1.mp3").unwrap();
//! assert_eq!(url, "http://example.com/Ep1.mp3");
//!
//! assert!(validate_url("http://127.0.0.1/").is_err());
//! ```

mod normalize;
mod url_validator;

pub use normalize::{normalize_url, NormalizeError};
pub use url_validator::{check_url, validate_url, UrlValidationError};
