//! # textmirror Protocol
//!
//! Version, update and text patch types for textmirror.
//!
//! This crate provides:
//! - `Version` sets and the `Update` message exchanged with the remote origin
//! - `WirePatch` ranges in code-point units as they travel on the wire
//! - `PositionTranslator` for code-point / UTF-16 code-unit offsets
//! - `diff` and `apply` over UTF-16 code-unit `Patch`es
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod diff;
mod error;
mod patch;
mod position;
mod update;
mod version;

pub use diff::diff;
pub use error::{ProtocolError, ProtocolResult};
pub use patch::{apply, Patch};
pub use position::{count_code_points, point_to_unit, unit_to_point, PositionTranslator};
pub use update::{parse_range, Payload, Update, WirePatch, TEXT_UNIT};
pub use version::Version;
