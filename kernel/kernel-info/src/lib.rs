//! # Kernel Configuration Constants
//!
//! Compile-time bounds shared by the memory-management crates. Every
//! validation check in the frame pool and the fault paths is phrased
//! against these values.

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod memory;
