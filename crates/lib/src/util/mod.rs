//! Shared utilities.
//!
//! Structural hashing, filesystem copies and test helpers.

pub mod fs;
pub mod hash;

#[cfg(test)]
pub mod testutil;
