use std::io;
use std::io::{Read, Seek, SeekFrom};
use std::time::Duration;

use citrace_format::{CiTrace, CtElement, MemoryLoad, RegisterWrite};
use pica_cmdlist::CommandList;
use pica_phys::{translate, Mapping, Region};
use pica_regs::mmio;
use tracing::{debug, warn};

use crate::gsp::{mmio_reg_offset, reg_window_offset, GspError, GspServices};
use crate::poll::poll_until;

/// Bytes moved per DMA request when loading video memory.
pub const DMA_CHUNK_SIZE: usize = 1024;

/// Completion-poll attempt budget after an operation-triggering register
/// write.
pub const POLL_ATTEMPTS: u32 = 100;

/// Sleep between completion-poll attempts.
pub const POLL_INTERVAL: Duration = Duration::from_micros(1);

/// Why a playback session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    /// The cancellation signal was observed at a checkpoint.
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("trace file read failed during playback: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Gsp(#[from] GspError),
    /// The decoder and the stream are out of sync; recovery is not safe.
    #[error("unrecognized stream element type 0x{raw_type:x}")]
    UnrecognizedElement { raw_type: u32 },
}

/// Tunables for the completion poll after triggered operations.
#[derive(Debug, Clone, Copy)]
pub struct PlaybackConfig {
    pub poll_attempts: u32,
    pub poll_interval: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            poll_attempts: POLL_ATTEMPTS,
            poll_interval: POLL_INTERVAL,
        }
    }
}

/// Drives a decoded trace against the hardware services.
///
/// One instance per playback session. The command list is borrowed read-only
/// and resubmitted at the top of every pass over the stream; the DMA scratch
/// buffer is owned here and reused across chunks.
pub struct Playback<'a> {
    trace: &'a CiTrace,
    command_list: &'a CommandList,
    config: PlaybackConfig,
    scratch: Vec<u8>,
}

impl<'a> Playback<'a> {
    pub fn new(trace: &'a CiTrace, command_list: &'a CommandList) -> Self {
        Self::with_config(trace, command_list, PlaybackConfig::default())
    }

    pub fn with_config(
        trace: &'a CiTrace,
        command_list: &'a CommandList,
        config: PlaybackConfig,
    ) -> Self {
        Self {
            trace,
            command_list,
            config,
            scratch: vec![0u8; DMA_CHUNK_SIZE],
        }
    }

    /// Replay the stream repeatedly until cancelled.
    ///
    /// Each pass re-asserts the captured baseline state before the recorded
    /// elements are applied. `cancel` is checked once per pass and once per
    /// element; it is cooperative and cannot interrupt an in-flight DMA chunk
    /// or register poll.
    pub fn run_session<R, G, F>(
        &mut self,
        reader: &mut R,
        gsp: &mut G,
        mut cancel: F,
    ) -> Result<SessionExit, PlaybackError>
    where
        R: Read + Seek,
        G: GspServices,
        F: FnMut() -> bool,
    {
        loop {
            if cancel() {
                return Ok(SessionExit::Cancelled);
            }
            if let Some(exit) = self.run_pass(reader, gsp, &mut cancel)? {
                return Ok(exit);
            }
        }
    }

    /// One full pass: re-assert baseline state, then replay every element.
    ///
    /// Returns `Some` if cancellation was observed at an element checkpoint.
    pub fn run_pass<R, G, F>(
        &mut self,
        reader: &mut R,
        gsp: &mut G,
        cancel: &mut F,
    ) -> Result<Option<SessionExit>, PlaybackError>
    where
        R: Read + Seek,
        G: GspServices,
        F: FnMut() -> bool,
    {
        self.frame_setup(reader, gsp)?;
        for index in 0..self.trace.stream.len() {
            if cancel() {
                return Ok(Some(SessionExit::Cancelled));
            }
            let element = self.trace.stream[index];
            self.play_element(reader, gsp, element)?;
        }
        Ok(None)
    }

    /// Re-assert the captured baseline before a stream pass.
    fn frame_setup<R, G>(&mut self, reader: &mut R, gsp: &mut G) -> Result<(), PlaybackError>
    where
        R: Read + Seek,
        G: GspServices,
    {
        gsp.submit_command_words(self.command_list.words(), 1)?;
        debug!(
            "baseline command list submitted ({} words)",
            self.command_list.len()
        );

        // The command submission path reads these two registers back; prime
        // them from the snapshot before any replayed write references them.
        let init = &self.trace.header.initial_state;
        let snapshot_bytes = u64::from(init.gpu_registers_size) * 4;
        let primed = [
            (mmio::CMDLIST_SIZE_PADDR, mmio::CMDLIST_SIZE_OFFSET),
            (mmio::CMDLIST_ADDR_PADDR, mmio::CMDLIST_ADDR_OFFSET),
        ];
        for (paddr, snapshot_offset) in primed {
            if u64::from(snapshot_offset) + 4 > snapshot_bytes {
                warn!(
                    "gpu register snapshot too small to prime the register at byte offset \
                     0x{snapshot_offset:x}; skipping"
                );
                continue;
            }
            reader.seek(SeekFrom::Start(
                u64::from(init.gpu_registers) + u64::from(snapshot_offset),
            ))?;
            let mut word = [0u8; 4];
            reader.read_exact(&mut word)?;
            gsp.write_hw_regs(mmio_reg_offset(paddr), &word)?;
        }
        Ok(())
    }

    fn play_element<R, G>(
        &mut self,
        reader: &mut R,
        gsp: &mut G,
        element: CtElement,
    ) -> Result<(), PlaybackError>
    where
        R: Read + Seek,
        G: GspServices,
    {
        match element {
            CtElement::FrameMarker => {
                debug!("reached end of current frame");
                gsp.swap_buffers()?;
                gsp.wait_for_vblank();
                Ok(())
            }
            CtElement::MemoryLoad(load) => self.play_memory_load(reader, gsp, load),
            CtElement::RegisterWrite(write) => self.play_register_write(gsp, write),
            CtElement::Unknown { raw_type } => {
                Err(PlaybackError::UnrecognizedElement { raw_type })
            }
        }
    }

    fn play_memory_load<R, G>(
        &mut self,
        reader: &mut R,
        gsp: &mut G,
        load: MemoryLoad,
    ) -> Result<(), PlaybackError>
    where
        R: Read + Seek,
        G: GspServices,
    {
        let mapping = match translate(load.physical_address) {
            Ok(mapping) => mapping,
            Err(err) => {
                warn!("skipping memory load: {err}");
                return Ok(());
            }
        };
        let Mapping::Mapped { vaddr, region } = mapping else {
            warn!("skipping memory load with a null destination address");
            return Ok(());
        };

        reader.seek(SeekFrom::Start(load.file_offset.into()))?;

        if region == Region::Vram {
            // VRAM rejects direct CPU writes; bounce through DMA in bounded
            // chunks, reusing one scratch buffer.
            debug!(
                "loading 0x{:x} VRAM bytes from file offset 0x{:x} to 0x{:08x} (vaddr 0x{:08x})",
                load.size, load.file_offset, load.physical_address, vaddr
            );
            let mut remaining = load.size as usize;
            let mut dest_paddr = load.physical_address;
            while remaining > 0 {
                let chunk = remaining.min(DMA_CHUNK_SIZE);
                let dest_vaddr = match translate(dest_paddr) {
                    Ok(Mapping::Mapped { vaddr, .. }) => vaddr,
                    _ => {
                        warn!(
                            "memory load ran past the video memory region at 0x{dest_paddr:08x}; \
                             dropping the rest of this load"
                        );
                        break;
                    }
                };
                reader.read_exact(&mut self.scratch[..chunk])?;
                gsp.flush_buffer(&self.scratch[..chunk])?;
                gsp.request_dma(&self.scratch[..chunk], dest_vaddr)?;
                gsp.wait_for_dma()?;
                remaining -= chunk;
                dest_paddr = dest_paddr.wrapping_add(chunk as u32);
            }
        } else {
            debug!(
                "loading 0x{:x} bytes from file offset 0x{:x} to 0x{:08x} (vaddr 0x{:08x})",
                load.size, load.file_offset, load.physical_address, vaddr
            );
            let mut data = vec![0u8; load.size as usize];
            reader.read_exact(&mut data)?;
            gsp.write_memory(vaddr, &data)?;
            // The GPU does not snoop the CPU cache.
            gsp.flush_range(vaddr, load.size)?;
        }
        Ok(())
    }

    fn play_register_write<G: GspServices>(
        &mut self,
        gsp: &mut G,
        write: RegisterWrite,
    ) -> Result<(), PlaybackError> {
        let Some(size) = write.size() else {
            warn!(
                "skipping register write with invalid size class 0x{:x}",
                write.size_class
            );
            return Ok(());
        };

        let mapping = match translate(write.physical_address) {
            Ok(mapping) => mapping,
            Err(err) => {
                warn!("skipping register write: {err}");
                return Ok(());
            }
        };
        let Mapping::Mapped {
            vaddr,
            region: Region::Io,
        } = mapping
        else {
            warn!(
                "skipping register write outside the MMIO window (0x{:08x})",
                write.physical_address
            );
            return Ok(());
        };
        let offset = reg_window_offset(vaddr);

        match mmio::register_name(write.physical_address) {
            Some(name) => debug!(
                "writing 0x{:x} to register 0x{:08x} ({name})",
                write.value, write.physical_address
            ),
            None => debug!(
                "writing 0x{:x} to register 0x{:08x}",
                write.value, write.physical_address
            ),
        }

        if write.physical_address == mmio::CMDLIST_TRIGGER_PADDR {
            // Writing the processing trigger directly freezes the GPU
            // sometimes, for unknown reasons; reroute through a full
            // command-list submission using the size and address registers
            // primed during frame setup. Still misbehaves occasionally on
            // hardware.
            let mut word = [0u8; 4];
            gsp.read_hw_regs(mmio_reg_offset(mmio::CMDLIST_SIZE_PADDR), &mut word)?;
            let len_bytes = u32::from_le_bytes(word);
            gsp.read_hw_regs(mmio_reg_offset(mmio::CMDLIST_ADDR_PADDR), &mut word)?;
            // The address register stores the buffer address divided by 8.
            let list_paddr = u32::from_le_bytes(word).wrapping_mul(8);
            match translate(list_paddr) {
                Ok(Mapping::Mapped { vaddr, .. }) => {
                    gsp.submit_command_range(vaddr, len_bytes, write.value as u32)?;
                }
                Ok(Mapping::Null) | Err(_) => {
                    warn!(
                        "command list address register points nowhere (0x{list_paddr:08x}); \
                         dropping the trigger"
                    );
                }
            }
        } else {
            let bytes = write.value.to_le_bytes();
            gsp.write_hw_regs(offset, &bytes[..size.byte_len()])?;
        }

        if mmio::OPERATION_TRIGGER_PADDRS.contains(&write.physical_address) {
            debug!("waiting for the triggered operation to finish");
            let interval = self.config.poll_interval;
            let observed = poll_until(
                self.config.poll_attempts,
                gsp,
                |gsp| {
                    let mut word = [0u8; 4];
                    gsp.read_hw_regs(offset, &mut word)?;
                    Ok::<_, GspError>(u32::from_le_bytes(word) & 1 != 0)
                },
                |gsp| gsp.sleep(interval),
            )?;
            if !observed {
                debug!(
                    "operation still busy after {} poll attempts; continuing",
                    self.config.poll_attempts
                );
            }
        }

        Ok(())
    }
}
