//! Core data structures used across the pipeline worker.

pub mod index_base;
pub mod pipeline;
