//! Test infrastructure for the record gateway.
//!
//! Shared record fixtures and a store wrapper that counts round trips.

#![allow(dead_code)]

pub mod fixtures;
pub mod harness;

pub use fixtures::*;
pub use harness::*;
