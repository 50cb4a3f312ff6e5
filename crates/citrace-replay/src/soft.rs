use std::collections::HashMap;
use std::time::Duration;

use pica_regs::mmio;

use crate::gsp::{mmio_reg_offset, GspError, GspServices};

/// Operation counters accumulated during a replay.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SoftGspStats {
    pub frames_presented: u64,
    pub command_lists_submitted: u64,
    pub register_writes: u64,
    pub memory_bytes_written: u64,
    pub dma_transfers: u64,
    pub dma_bytes: u64,
}

/// Host-side stand-in for the GSP services.
///
/// Hardware registers are a sparse byte map; triggered operations complete
/// immediately (the ready bit goes high as soon as the trigger write lands);
/// memory writes and DMA transfers are accounted but not stored. Useful for
/// validating a trace headlessly and for integration tests.
#[derive(Debug, Default)]
pub struct SoftGsp {
    regs: HashMap<u32, u8>,
    stats: SoftGspStats,
    dma_in_flight: bool,
}

impl SoftGsp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> SoftGspStats {
        self.stats
    }

    /// Read back a register word (diagnostics and tests).
    pub fn reg_u32(&self, offset: u32) -> u32 {
        let mut word = [0u8; 4];
        for (i, byte) in word.iter_mut().enumerate() {
            *byte = self
                .regs
                .get(&(offset.wrapping_add(i as u32)))
                .copied()
                .unwrap_or(0);
        }
        u32::from_le_bytes(word)
    }

    fn store(&mut self, offset: u32, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            self.regs.insert(offset.wrapping_add(i as u32), *byte);
        }
    }
}

impl GspServices for SoftGsp {
    fn write_hw_regs(&mut self, offset: u32, data: &[u8]) -> Result<(), GspError> {
        self.store(offset, data);
        self.stats.register_writes += 1;

        // Triggered operations have no latency in the soft model: raise the
        // ready bit so completion polls return on their first read.
        if mmio::OPERATION_TRIGGER_PADDRS
            .iter()
            .any(|&paddr| mmio_reg_offset(paddr) == offset)
        {
            let ready = self.reg_u32(offset) | 1;
            self.store(offset, &ready.to_le_bytes());
        }
        Ok(())
    }

    fn read_hw_regs(&mut self, offset: u32, out: &mut [u8]) -> Result<(), GspError> {
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self
                .regs
                .get(&(offset.wrapping_add(i as u32)))
                .copied()
                .unwrap_or(0);
        }
        Ok(())
    }

    fn submit_command_words(&mut self, _words: &[u32], _param: u32) -> Result<(), GspError> {
        self.stats.command_lists_submitted += 1;
        Ok(())
    }

    fn submit_command_range(
        &mut self,
        _vaddr: u32,
        _len_bytes: u32,
        _param: u32,
    ) -> Result<(), GspError> {
        self.stats.command_lists_submitted += 1;
        Ok(())
    }

    fn write_memory(&mut self, _vaddr: u32, data: &[u8]) -> Result<(), GspError> {
        self.stats.memory_bytes_written += data.len() as u64;
        Ok(())
    }

    fn flush_buffer(&mut self, _buf: &[u8]) -> Result<(), GspError> {
        Ok(())
    }

    fn flush_range(&mut self, _vaddr: u32, _len: u32) -> Result<(), GspError> {
        Ok(())
    }

    fn request_dma(&mut self, src: &[u8], _dest_vaddr: u32) -> Result<(), GspError> {
        if self.dma_in_flight {
            return Err(GspError::new("GX_RequestDma", "transfer already in flight"));
        }
        self.dma_in_flight = true;
        self.stats.dma_transfers += 1;
        self.stats.dma_bytes += src.len() as u64;
        Ok(())
    }

    fn wait_for_dma(&mut self) -> Result<(), GspError> {
        self.dma_in_flight = false;
        Ok(())
    }

    fn swap_buffers(&mut self) -> Result<(), GspError> {
        self.stats.frames_presented += 1;
        Ok(())
    }

    fn wait_for_vblank(&mut self) {}

    fn sleep(&mut self, _interval: Duration) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_read_back_what_was_written() {
        let mut gsp = SoftGsp::new();
        gsp.write_hw_regs(0x40_18E0, &0x1234_5678u32.to_le_bytes()).unwrap();
        assert_eq!(gsp.reg_u32(0x40_18E0), 0x1234_5678);

        let mut out = [0u8; 2];
        gsp.read_hw_regs(0x40_18E0, &mut out).unwrap();
        assert_eq!(out, [0x78, 0x56]);
    }

    #[test]
    fn trigger_writes_complete_immediately() {
        let mut gsp = SoftGsp::new();
        let offset = mmio_reg_offset(mmio::MEMORY_FILL_CONTROL1_PADDR);
        gsp.write_hw_regs(offset, &0x10u32.to_le_bytes()).unwrap();
        assert_eq!(gsp.reg_u32(offset) & 1, 1);
    }

    #[test]
    fn overlapping_dma_requests_are_rejected() {
        let mut gsp = SoftGsp::new();
        gsp.request_dma(&[0u8; 16], 0x1F00_0000).unwrap();
        assert!(gsp.request_dma(&[0u8; 16], 0x1F00_0400).is_err());
        gsp.wait_for_dma().unwrap();
        gsp.request_dma(&[0u8; 16], 0x1F00_0400).unwrap();
    }
}
