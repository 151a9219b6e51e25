//! Kernel binary entry point.
//!
//! The real entry symbol, `_start`, is the `global_asm!` block in
//! `arch::<target>::boot` — it runs before any Rust-level `main` could, so
//! this crate only needs to exist to pull the library (and, transitively,
//! that assembly) into the link.

#![no_std]
#![no_main]

use bullfinch as _;
