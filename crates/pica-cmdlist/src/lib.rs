#![forbid(unsafe_code)]

//! PICA command-list construction for trace playback.
//!
//! The GPU consumes lists of 32-bit words: a value word, a header word
//! addressing a register, then any extra parameter words the header declares.
//! [`build_initial_state`] assembles the single list that restores the
//! captured GPU state before the recorded stream plays.

mod builder;
mod f24;
mod list;

pub use builder::{build_initial_state, BuildError};
pub use f24::{pack_f24x4, unpack_f24x4};
pub use list::{command_header, CommandList};
