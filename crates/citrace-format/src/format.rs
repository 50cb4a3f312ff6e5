//! On-disk layout of the CiTrace container.
//!
//! All fields are little-endian. The file begins with a fixed
//! [`CT_HEADER_SIZE`]-byte header; the recorded stream is a flat array of
//! [`CT_STREAM_ELEMENT_SIZE`]-byte records starting at the header's
//! `stream_offset`.

/// Magic word at file offset 0.
pub const CT_MAGIC: [u8; 4] = *b"CiTr";

/// Container version this crate was written against. Older or newer versions
/// decode with a warning rather than an error.
pub const EXPECTED_VERSION: u32 = 1;

/// Size in bytes of the fixed header.
pub const CT_HEADER_SIZE: u32 = 100;

/// Size in bytes of one stream element record.
pub const CT_STREAM_ELEMENT_SIZE: u32 = 24;

pub(crate) const ELEMENT_FRAME_MARKER: u32 = 0xE1;
pub(crate) const ELEMENT_MEMORY_LOAD: u32 = 0xE2;
pub(crate) const ELEMENT_REGISTER_WRITE: u32 = 0xE3;

pub(crate) const SIZE_CLASS_8: u32 = 0xD1;
pub(crate) const SIZE_CLASS_16: u32 = 0xD2;
pub(crate) const SIZE_CLASS_32: u32 = 0xD3;
pub(crate) const SIZE_CLASS_64: u32 = 0xD4;

/// (offset, size) pairs locating the initial-state side tables.
///
/// Offsets are byte offsets into the trace file. Sizes are in 32-bit words:
/// the actual hardware limits of the register ranges were not known to the
/// capture tooling, so the presumed limits are stored alongside the offsets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitialStateOffsets {
    pub gpu_registers: u32,
    pub gpu_registers_size: u32,
    /// Present in the container but unused by playback.
    pub lcd_registers: u32,
    pub lcd_registers_size: u32,
    pub pica_registers: u32,
    pub pica_registers_size: u32,
    pub default_attributes: u32,
    pub default_attributes_size: u32,
    pub vs_program_binary: u32,
    pub vs_program_binary_size: u32,
    pub vs_swizzle_data: u32,
    pub vs_swizzle_data_size: u32,
    pub vs_float_uniforms: u32,
    pub vs_float_uniforms_size: u32,
    pub gs_program_binary: u32,
    pub gs_program_binary_size: u32,
    pub gs_swizzle_data: u32,
    pub gs_swizzle_data_size: u32,
    pub gs_float_uniforms: u32,
    pub gs_float_uniforms_size: u32,
}

/// Decoded trace header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CtHeader {
    pub version: u32,
    pub header_size: u32,
    pub initial_state: InitialStateOffsets,
    pub stream_offset: u32,
    /// Number of stream element records, not bytes.
    pub stream_size: u32,
}

/// A contiguous byte range to copy from the trace file into hardware-visible
/// memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLoad {
    pub file_offset: u32,
    pub size: u32,
    pub physical_address: u32,
}

/// A single recorded hardware register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterWrite {
    pub physical_address: u32,
    /// Raw size-class tag; see [`RegisterWriteSize::from_raw`].
    pub size_class: u32,
    pub value: u64,
}

impl RegisterWrite {
    /// Classify the recorded access width, or `None` for a tag outside the
    /// defined size classes.
    pub fn size(&self) -> Option<RegisterWriteSize> {
        RegisterWriteSize::from_raw(self.size_class)
    }
}

/// Access width of a recorded register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterWriteSize {
    U8,
    U16,
    U32,
    U64,
}

impl RegisterWriteSize {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            SIZE_CLASS_8 => Some(Self::U8),
            SIZE_CLASS_16 => Some(Self::U16),
            SIZE_CLASS_32 => Some(Self::U32),
            SIZE_CLASS_64 => Some(Self::U64),
            _ => None,
        }
    }

    pub fn byte_len(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
            Self::U64 => 8,
        }
    }
}

/// One recorded stream element.
///
/// Stream order is replay order: later elements may depend on the effects of
/// earlier ones (double-buffering, triggers), so no reordering or coalescing
/// is permitted. Unrecognized tags are preserved as [`CtElement::Unknown`] so
/// the playback dispatch point can treat them as a fatal decode inconsistency
/// with an exhaustive match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtElement {
    /// End of one rendered frame.
    FrameMarker,
    MemoryLoad(MemoryLoad),
    RegisterWrite(RegisterWrite),
    Unknown { raw_type: u32 },
}

/// A fully decoded trace: immutable after [`decode`](crate::decode) returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiTrace {
    pub header: CtHeader,
    pub stream: Vec<CtElement>,
}
