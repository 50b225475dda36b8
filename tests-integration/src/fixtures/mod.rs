//! Test fixtures for integration testing
//!
//! This module provides a reusable cleanup context around the in-memory
//! repository and a set of pre-delete listeners that record, fail, cancel or
//! block deletions.

mod cleanup_context;
mod listeners;

pub use cleanup_context::CleanupTestContext;
pub use listeners::{
    CancellingListener, EntityRemovingListener, FailingListener, GateListener, ListenerCall,
    RecordingListener,
};
