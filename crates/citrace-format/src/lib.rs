#![forbid(unsafe_code)]

//! CiTrace container format.
//!
//! A CiTrace is a capture of GPU activity: a fixed little-endian header locating
//! a set of initial-state side tables (register snapshots, shader binaries,
//! swizzle tables, uniform tables, default vertex attributes), followed by a
//! flat stream of fixed-size records describing memory loads, register writes
//! and frame boundaries in the order they were observed.
//!
//! This crate only decodes the container; it never interprets the semantics of
//! the recorded register writes.

mod format;
mod reader;

pub use format::{
    CiTrace, CtElement, CtHeader, InitialStateOffsets, MemoryLoad, RegisterWrite,
    RegisterWriteSize, CT_HEADER_SIZE, CT_MAGIC, CT_STREAM_ELEMENT_SIZE, EXPECTED_VERSION,
};
pub use reader::{decode, TraceReadError};
