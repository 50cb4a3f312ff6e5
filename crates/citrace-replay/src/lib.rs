#![forbid(unsafe_code)]

//! CiTrace playback engine.
//!
//! Drives a decoded trace against the hardware services: resubmits the
//! initial-state command list at the top of every pass, then replays the
//! recorded stream element by element, performing memory loads (direct or
//! DMA-bounced), register writes (direct or rerouted through command
//! submission), and frame-boundary synchronization paced against vblank.
//!
//! The hardware itself sits behind the [`GspServices`] trait; [`SoftGsp`] is
//! a host-side stand-in used by the CLI and by tests.

mod engine;
mod gsp;
mod poll;
mod soft;

pub use engine::{
    Playback, PlaybackConfig, PlaybackError, SessionExit, DMA_CHUNK_SIZE, POLL_ATTEMPTS,
    POLL_INTERVAL,
};
pub use gsp::{mmio_reg_offset, reg_window_offset, GspError, GspServices};
pub use poll::poll_until;
pub use soft::{SoftGsp, SoftGspStats};
