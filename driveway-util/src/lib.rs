//! Generic utilities the driveway crates depend upon but that are not tied
//! to the wire protocol itself.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod log;

#[cfg(any(feature = "defmt", feature = "log"))]
pub use self::log::*;

/// A generic error.
#[derive(Debug, Clone, Copy)]
pub struct Error;

/// A type alias for `Result<T, driveway_util::Error>`.
pub type Result<T> = core::result::Result<T, Error>;
