//! Common test utilities for integration tests.

#![allow(dead_code)]

pub mod faulty;
pub mod harness;

pub use faulty::{FaultyFs, Op};
pub use harness::{TestFs, init_tracing, test_key, warn_logging};
