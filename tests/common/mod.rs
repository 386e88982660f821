//! Common test utilities and helpers
//!
//! This module provides shared test infrastructure including:
//! - Test fixtures and factories
//! - Mock collaborators for the rule editor

#![allow(dead_code)]

pub mod mocks;

pub use factories::*;
pub use fixtures::*;
pub use mocks::*;
