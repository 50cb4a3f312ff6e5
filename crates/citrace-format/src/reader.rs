use std::io;
use std::io::{Read, Seek, SeekFrom};

use tracing::warn;

use crate::format::{
    CiTrace, CtElement, CtHeader, InitialStateOffsets, MemoryLoad, RegisterWrite,
    CT_STREAM_ELEMENT_SIZE, CT_MAGIC, ELEMENT_FRAME_MARKER, ELEMENT_MEMORY_LOAD,
    ELEMENT_REGISTER_WRITE, EXPECTED_VERSION,
};

#[derive(Debug)]
pub enum TraceReadError {
    Io(io::Error),
    /// The file does not start with the CiTrace magic word.
    BadMagic([u8; 4]),
    /// The header's stream (offset, size) pair does not fit in the file.
    TruncatedStream {
        stream_offset: u32,
        stream_size: u32,
        file_len: u64,
    },
}

impl core::fmt::Display for TraceReadError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TraceReadError::Io(err) => write!(f, "trace read failed: {err}"),
            TraceReadError::BadMagic(magic) => {
                write!(
                    f,
                    "invalid magic word: {:02x} {:02x} {:02x} {:02x}",
                    magic[0], magic[1], magic[2], magic[3]
                )
            }
            TraceReadError::TruncatedStream {
                stream_offset,
                stream_size,
                file_len,
            } => write!(
                f,
                "stream of {stream_size} elements at offset 0x{stream_offset:x} does not fit in \
                 a {file_len}-byte file"
            ),
        }
    }
}

impl std::error::Error for TraceReadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TraceReadError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for TraceReadError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Decode a CiTrace container.
///
/// The header is validated against the actual file length before anything is
/// read at the offsets it declares: an initial-state side table that points
/// past EOF is clamped to zero length (with a warning) rather than read past
/// the end, while an out-of-bounds stream is fatal, since playback without
/// the stream is meaningless.
///
/// A version mismatch is reported but does not abort decoding.
pub fn decode<R: Read + Seek>(reader: &mut R) -> Result<CiTrace, TraceReadError> {
    let file_len = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(0))?;

    let mut header = read_header(reader)?;
    if header.version != EXPECTED_VERSION {
        warn!(
            "unsupported CiTrace version {} (this decoder targets version {}); \
             attempting playback anyway",
            header.version, EXPECTED_VERSION
        );
    }

    clamp_side_tables(&mut header.initial_state, file_len);

    let stream_bytes = u64::from(header.stream_size) * u64::from(CT_STREAM_ELEMENT_SIZE);
    let stream_end = u64::from(header.stream_offset)
        .checked_add(stream_bytes)
        .ok_or(TraceReadError::TruncatedStream {
            stream_offset: header.stream_offset,
            stream_size: header.stream_size,
            file_len,
        })?;
    if stream_end > file_len {
        return Err(TraceReadError::TruncatedStream {
            stream_offset: header.stream_offset,
            stream_size: header.stream_size,
            file_len,
        });
    }

    reader.seek(SeekFrom::Start(header.stream_offset.into()))?;
    let mut stream = Vec::with_capacity(header.stream_size as usize);
    for _ in 0..header.stream_size {
        stream.push(read_element(reader)?);
    }

    Ok(CiTrace { header, stream })
}

fn read_header<R: Read>(reader: &mut R) -> Result<CtHeader, TraceReadError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != CT_MAGIC {
        return Err(TraceReadError::BadMagic(magic));
    }

    let version = read_u32(reader)?;
    let header_size = read_u32(reader)?;

    // Field order matches the on-disk layout exactly.
    let initial_state = InitialStateOffsets {
        gpu_registers: read_u32(reader)?,
        gpu_registers_size: read_u32(reader)?,
        lcd_registers: read_u32(reader)?,
        lcd_registers_size: read_u32(reader)?,
        pica_registers: read_u32(reader)?,
        pica_registers_size: read_u32(reader)?,
        default_attributes: read_u32(reader)?,
        default_attributes_size: read_u32(reader)?,
        vs_program_binary: read_u32(reader)?,
        vs_program_binary_size: read_u32(reader)?,
        vs_swizzle_data: read_u32(reader)?,
        vs_swizzle_data_size: read_u32(reader)?,
        vs_float_uniforms: read_u32(reader)?,
        vs_float_uniforms_size: read_u32(reader)?,
        gs_program_binary: read_u32(reader)?,
        gs_program_binary_size: read_u32(reader)?,
        gs_swizzle_data: read_u32(reader)?,
        gs_swizzle_data_size: read_u32(reader)?,
        gs_float_uniforms: read_u32(reader)?,
        gs_float_uniforms_size: read_u32(reader)?,
    };

    let stream_offset = read_u32(reader)?;
    let stream_size = read_u32(reader)?;

    Ok(CtHeader {
        version,
        header_size,
        initial_state,
        stream_offset,
        stream_size,
    })
}

/// Zero out the size of every side table whose (offset, size) pair does not
/// resolve inside the file. Sizes are in 32-bit words.
fn clamp_side_tables(init: &mut InitialStateOffsets, file_len: u64) {
    let pairs: [(&str, u32, &mut u32); 10] = [
        ("gpu_registers", init.gpu_registers, &mut init.gpu_registers_size),
        ("lcd_registers", init.lcd_registers, &mut init.lcd_registers_size),
        ("pica_registers", init.pica_registers, &mut init.pica_registers_size),
        (
            "default_attributes",
            init.default_attributes,
            &mut init.default_attributes_size,
        ),
        (
            "vs_program_binary",
            init.vs_program_binary,
            &mut init.vs_program_binary_size,
        ),
        ("vs_swizzle_data", init.vs_swizzle_data, &mut init.vs_swizzle_data_size),
        (
            "vs_float_uniforms",
            init.vs_float_uniforms,
            &mut init.vs_float_uniforms_size,
        ),
        (
            "gs_program_binary",
            init.gs_program_binary,
            &mut init.gs_program_binary_size,
        ),
        ("gs_swizzle_data", init.gs_swizzle_data, &mut init.gs_swizzle_data_size),
        (
            "gs_float_uniforms",
            init.gs_float_uniforms,
            &mut init.gs_float_uniforms_size,
        ),
    ];

    for (name, offset, size_words) in pairs {
        if *size_words == 0 {
            continue;
        }
        let end = u64::from(offset) + u64::from(*size_words) * 4;
        if end > file_len {
            warn!(
                "initial-state table {name} (offset 0x{offset:x}, {size} words) extends past \
                 the end of the file; treating it as empty",
                size = *size_words
            );
            *size_words = 0;
        }
    }
}

fn read_element<R: Read>(reader: &mut R) -> Result<CtElement, TraceReadError> {
    let mut record = [0u8; CT_STREAM_ELEMENT_SIZE as usize];
    reader.read_exact(&mut record)?;

    let tag = u32::from_le_bytes(record[0..4].try_into().unwrap());
    // record[4..8] is padding; the 16-byte payload starts at offset 8.
    Ok(match tag {
        ELEMENT_FRAME_MARKER => CtElement::FrameMarker,
        ELEMENT_MEMORY_LOAD => CtElement::MemoryLoad(MemoryLoad {
            file_offset: u32::from_le_bytes(record[8..12].try_into().unwrap()),
            size: u32::from_le_bytes(record[12..16].try_into().unwrap()),
            physical_address: u32::from_le_bytes(record[16..20].try_into().unwrap()),
        }),
        ELEMENT_REGISTER_WRITE => CtElement::RegisterWrite(RegisterWrite {
            physical_address: u32::from_le_bytes(record[8..12].try_into().unwrap()),
            size_class: u32::from_le_bytes(record[12..16].try_into().unwrap()),
            value: u64::from_le_bytes(record[16..24].try_into().unwrap()),
        }),
        raw_type => CtElement::Unknown { raw_type },
    })
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, TraceReadError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}
