//! Data generators for integration testing
//!
//! This module provides utilities for generating revision histories with
//! controlled sizes and ages.

mod history_generator;

pub use history_generator::HistoryGenerator;
