// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Shared definitions for the dumplens crates.
//!
//! This crate holds the raw, on-disk minidump structure definitions
//! ([`format`]), the NT status code table ([`nt_status`]), and a few small
//! traits used by the parser and triage crates ([`traits`]).
//!
//! Most users want the `dumplens` crate instead; this one exists so that the
//! parser and the triage engine can agree on layouts without depending on
//! each other.

#![warn(missing_debug_implementations)]

pub mod format;
pub mod nt_status;
pub mod traits;
