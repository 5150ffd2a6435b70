// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! A parser for the minidump file format.
//!
//! The `dumplens` crate turns the bytes of a Windows minidump (`.dmp`) file
//! into a structured, queryable [`ParsedDump`]: the faulting exception,
//! per-thread register state, the loaded module layout, captured memory
//! regions, and system identification. The companion `dumplens-triage`
//! crate consumes a `ParsedDump` to reconstruct the faulting call stack and
//! assign blame to a module.
//!
//! Parsing is a pure function of the input bytes. The returned dump borrows
//! the caller's blob, is immutable after construction, and only ever fails
//! outright for the three container-level problems listed in [`Error`];
//! any individual stream that cannot be decoded is simply absent.
//!
//! # Examples
//!
//! ```no_run
//! use dumplens::ParsedDump;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = std::fs::read("crash.dmp")?;
//! let dump = ParsedDump::parse(&data)?;
//! if let Some(exception) = &dump.exception {
//!     println!(
//!         "crashed at {}",
//!         dump.resolve(exception.raw.exception_record.exception_address)
//!     );
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_debug_implementations)]

mod context;
mod dump;
pub mod read;
mod streams;

pub use context::read_context;
pub use dump::{map_file, Error, ParsedDump};
pub use streams::*;

// Re-export the raw layouts so downstream crates only need one dependency.
pub use dumplens_common::format;
pub use dumplens_common::nt_status;
