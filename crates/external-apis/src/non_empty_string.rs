// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Non-empty string validation utilities
//!
//! This module provides [`NonEmptyString`], a wrapper that makes blank
//! credentials unrepresentable. Bot tokens and chat ids are validated once at
//! construction instead of at every use site.
//!
//! # Examples
//!
//! ```rust
//! use external_apis::NonEmptyString;
//!
//! let token = NonEmptyString::new("123456:bot-secret").expect("Valid token");
//! assert_eq!(token.as_str(), "123456:bot-secret");
//!
//! assert!(NonEmptyString::new("").is_err());
//! assert!(NonEmptyString::new("   \t\n  ").is_err());
//! ```

use core::fmt;
use std::str::FromStr;

/// A non-empty string wrapper that ensures validity at construction
///
/// The contained string holds at least one non-whitespace character and is
/// immutable afterwards; `Box<str>` keeps the footprint minimal.
///
/// # Examples
///
/// ```rust
/// use external_apis::NonEmptyString;
///
/// let chat_id = NonEmptyString::new("-1001234567890").unwrap();
/// assert_eq!(chat_id.as_str(), "-1001234567890");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyString(Box<str>);

impl NonEmptyString {
    /// Create a new `NonEmptyString` from any string-like input
    ///
    /// Leading or trailing whitespace is accepted as long as some
    /// non-whitespace content exists.
    ///
    /// # Errors
    ///
    /// Returns a descriptive message when the input is empty or
    /// whitespace-only.
    pub fn new(s: impl Into<String>) -> Result<Self, String> {
        let s = s.into();
        if s.trim().is_empty() {
            Err("String cannot be empty or whitespace-only".to_string())
        } else {
            Ok(NonEmptyString(s.into_boxed_str()))
        }
    }

    /// Get a string slice of the contained value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NonEmptyString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NonEmptyString {
    type Err = String;

    /// Parse a `NonEmptyString` from a string slice
    ///
    /// ```rust
    /// use external_apis::NonEmptyString;
    ///
    /// let parsed: NonEmptyString = "mainnet".parse().expect("Valid string");
    /// assert_eq!(parsed.as_str(), "mainnet");
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for NonEmptyString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
