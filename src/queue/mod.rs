//! # Offline Queue Module
//!
//! Durable local log of location submissions made while disconnected.
//!
//! This module handles:
//! - Key-value persistence that survives restarts (file-backed by default)
//! - The JSON layout of persisted entries
//! - FIFO enqueue and one-at-a-time removal under a single writer

pub mod record;
pub mod storage;
pub mod store;

pub use store::{OfflineQueue, SharedQueue};
