use std::time::Duration;

use pica_phys::{GSP_REG_WINDOW_VADDR, IO_AREA_PADDR, IO_AREA_VADDR};

/// Failure reported by a GSP/GX service call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{call} failed: {detail}")]
pub struct GspError {
    call: &'static str,
    detail: String,
}

impl GspError {
    pub fn new(call: &'static str, detail: impl Into<String>) -> Self {
        Self {
            call,
            detail: detail.into(),
        }
    }
}

/// Hardware services the playback engine drives.
///
/// Implementations wrap the platform's GSP/GX interface. Register I/O is
/// addressed by byte offset within the GSP register window (see
/// [`reg_window_offset`]). Command-list submission from a host buffer is
/// responsible for placing the words in GPU-visible memory and flushing
/// caches before triggering processing.
pub trait GspServices {
    /// Write `data.len()` bytes to the hardware register at `offset`.
    fn write_hw_regs(&mut self, offset: u32, data: &[u8]) -> Result<(), GspError>;

    /// Read `out.len()` bytes from the hardware register at `offset`.
    fn read_hw_regs(&mut self, offset: u32, out: &mut [u8]) -> Result<(), GspError>;

    /// Submit a command list from a host word buffer; `param` is handed to
    /// the processing trigger.
    fn submit_command_words(&mut self, words: &[u32], param: u32) -> Result<(), GspError>;

    /// Submit the command list already resident at `vaddr`.
    fn submit_command_range(&mut self, vaddr: u32, len_bytes: u32, param: u32)
        -> Result<(), GspError>;

    /// Copy bytes directly into hardware-visible memory at `vaddr`.
    fn write_memory(&mut self, vaddr: u32, data: &[u8]) -> Result<(), GspError>;

    /// Flush a host buffer from the CPU data cache before the GPU reads it.
    fn flush_buffer(&mut self, buf: &[u8]) -> Result<(), GspError>;

    /// Flush a range of hardware-visible memory from the CPU data cache.
    fn flush_range(&mut self, vaddr: u32, len: u32) -> Result<(), GspError>;

    /// Start a DMA transfer from a host buffer to `dest_vaddr`.
    fn request_dma(&mut self, src: &[u8], dest_vaddr: u32) -> Result<(), GspError>;

    /// Block until the in-flight DMA transfer completes. There is no timeout:
    /// a stalled DMA engine stalls playback.
    fn wait_for_dma(&mut self) -> Result<(), GspError>;

    /// Present the completed frame.
    fn swap_buffers(&mut self) -> Result<(), GspError>;

    /// Block until the next vertical blank.
    fn wait_for_vblank(&mut self);

    /// Sleep between completion-poll attempts.
    fn sleep(&mut self, interval: Duration);
}

/// Offset of a translated local MMIO address within the GSP register window.
pub fn reg_window_offset(vaddr: u32) -> u32 {
    vaddr - GSP_REG_WINDOW_VADDR
}

/// Register-window offset of a GPU MMIO register given its physical address
/// in the IO area.
pub const fn mmio_reg_offset(paddr: u32) -> u32 {
    paddr - IO_AREA_PADDR + IO_AREA_VADDR - GSP_REG_WINDOW_VADDR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_offsets_match_the_io_area_delta() {
        assert_eq!(mmio_reg_offset(0x1040_18E0), 0x40_18E0);
        assert_eq!(mmio_reg_offset(0x1040_001C), 0x40_001C);
        // Both routes to an offset agree.
        let vaddr = 0x1040_18E0 - IO_AREA_PADDR + IO_AREA_VADDR;
        assert_eq!(reg_window_offset(vaddr), mmio_reg_offset(0x1040_18E0));
    }
}
