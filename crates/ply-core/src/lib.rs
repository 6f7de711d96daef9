#![forbid(unsafe_code)]

//! Shared primitives used across the plymouthd workspace: rectangle
//! geometry, the error taxonomy from spec §7, sysexits codes, structured
//! logging setup, the kernel-command-line parser, and the INI-like
//! configuration file loader.

pub mod cmdline;
pub mod config;
pub mod error;
pub mod geometry;
pub mod logging;
pub mod sysexits;

pub use error::{Error, Result};
pub use geometry::Rect;
