//! # textmirror Testkit
//!
//! Test utilities for textmirror.
//!
//! This crate provides:
//! - Property-based text generators using proptest, biased towards
//!   multi-byte and surrogate-pair characters
//! - Temporary mirror directories
//! - Test log initialization
//!
//! It deliberately depends on none of the textmirror crates, so every
//! crate in the workspace can use it as a dev-dependency.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use textmirror_testkit::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn roundtrip(text in text_strategy(0..32)) {
//!         // ...
//!     }
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
