//! I/O utilities for the dispatch core
//!
//! This module provides the buffer lifecycle shared by the decode and
//! encode paths.
//!
//! # Sharded Allocator
//!
//! The [`Allocator`] pools byte buffers in power-of-two size classes with
//! one lock-free free list per class. [`PooledBuf`] is the RAII handle
//! that returns its buffer to the pool on drop.

mod allocator;

pub use allocator::{
    Allocator, AllocatorStats, AllocatorStatsSnapshot, PooledBuf, DEFAULT_MAX_POOLED_EXP,
};
