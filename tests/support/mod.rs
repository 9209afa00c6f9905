//! Shared helpers for integration tests: isolated session stores, sample
//! session artifacts, and certificate fixture paths.

#![allow(dead_code)]

pub mod session_fixtures;
