use std::io;
use std::io::{Read, Seek, SeekFrom};

use citrace_format::CtHeader;
use pica_regs::{internal, RegisterStateMask};

use crate::f24::pack_f24x4;
use crate::list::{command_header, CommandList};

/// Errors from initial-state construction.
///
/// A read past the end of the capture is fatal: a partially restored baseline
/// would make every subsequent frame meaningless, so there is no best-effort
/// mode.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("trace file ended while reading initial state: {0}")]
    Io(#[from] io::Error),
}

/// Assemble the command list that restores the GPU state captured at trace
/// start.
///
/// Shader programs, swizzle tables and uniforms are uploaded first; the
/// register snapshot is replayed last and in ascending index order, because
/// those uploads are themselves performed through register writes and later
/// registers may depend on earlier ones being configured.
pub fn build_initial_state<R: Read + Seek>(
    reader: &mut R,
    header: &CtHeader,
    mask: &RegisterStateMask,
) -> Result<CommandList, BuildError> {
    let mut list = CommandList::new();
    let init = &header.initial_state;

    // Default vertex attributes: one 4-word slot per attribute, repacked into
    // the hardware's 3-word float24 layout.
    let attr_count = init.default_attributes_size / 4;
    if attr_count != 0 {
        reader.seek(SeekFrom::Start(init.default_attributes.into()))?;
        for slot in 0..attr_count {
            let values = read_u32x4(reader)?;
            list.push(slot);
            list.push(command_header(internal::VS_DEFAULT_ATTR_INDEX, 0xF, 3));
            for word in pack_f24x4(values) {
                list.push(word);
            }
        }
    }

    submit_internal_memory(
        reader,
        &mut list,
        init.gs_program_binary,
        init.gs_program_binary_size,
        internal::GS_PROGRAM_OFFSET,
        false,
    )?;
    submit_internal_memory(
        reader,
        &mut list,
        init.gs_swizzle_data,
        init.gs_swizzle_data_size,
        internal::GS_SWIZZLE_OFFSET,
        false,
    )?;
    submit_internal_memory(
        reader,
        &mut list,
        init.gs_float_uniforms,
        init.gs_float_uniforms_size,
        internal::GS_FLOAT_UNIFORM_INDEX,
        true,
    )?;
    submit_internal_memory(
        reader,
        &mut list,
        init.vs_program_binary,
        init.vs_program_binary_size,
        internal::VS_PROGRAM_OFFSET,
        false,
    )?;
    submit_internal_memory(
        reader,
        &mut list,
        init.vs_swizzle_data,
        init.vs_swizzle_data_size,
        internal::VS_SWIZZLE_OFFSET,
        false,
    )?;
    submit_internal_memory(
        reader,
        &mut list,
        init.vs_float_uniforms,
        init.vs_float_uniforms_size,
        internal::VS_FLOAT_UNIFORM_INDEX,
        true,
    )?;

    if init.pica_registers_size != 0 {
        reader.seek(SeekFrom::Start(init.pica_registers.into()))?;
        let count = (init.pica_registers_size as usize).min(mask.len());
        for regid in 0..count {
            let value = read_u32(reader)?;
            let lanes = mask.get(regid);
            if lanes == 0 {
                // One-shot trigger register, not persistent state.
                continue;
            }
            list.push(value);
            list.push(command_header(regid as u16, lanes, 0));
        }
    }

    list.pad_to_submit_granularity();
    Ok(list)
}

/// Queue an upload of `num_words` words at `file_offset` into GPU-internal
/// memory addressed through `reg_id` (the index register; the data FIFO is
/// `reg_id + 1`). Float-uniform tables are repacked 4-to-3; everything else
/// uploads verbatim. A zero word count is a no-op.
fn submit_internal_memory<R: Read + Seek>(
    reader: &mut R,
    list: &mut CommandList,
    file_offset: u32,
    num_words: u32,
    reg_id: u16,
    is_float_uniform: bool,
) -> Result<(), BuildError> {
    if num_words == 0 {
        return Ok(());
    }

    // Reset the target index register, then stream words into the data FIFO.
    list.push(0);
    list.push(command_header(reg_id, 0xF, 0));

    reader.seek(SeekFrom::Start(file_offset.into()))?;

    // TODO: uploads larger than 256 words overflow the 8-bit extra-parameter
    // count field and need to be split into multiple commands.

    if is_float_uniform {
        let groups = num_words / 4;
        for group in 0..groups {
            let values = read_u32x4(reader)?;
            let [w0, w1, w2] = pack_f24x4(values);
            list.push(w0);
            if group == 0 {
                list.push(command_header(reg_id + 1, 0xF, groups * 3 - 1));
            }
            list.push(w1);
            list.push(w2);
        }
    } else {
        let first = read_u32(reader)?;
        list.push(first);
        list.push(command_header(reg_id + 1, 0xF, num_words - 1));
        for _ in 1..num_words {
            list.push(read_u32(reader)?);
        }
    }

    Ok(())
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u32x4<R: Read>(reader: &mut R) -> io::Result<[u32; 4]> {
    let mut buf = [0u8; 16];
    reader.read_exact(&mut buf)?;
    Ok([
        u32::from_le_bytes(buf[0..4].try_into().unwrap()),
        u32::from_le_bytes(buf[4..8].try_into().unwrap()),
        u32::from_le_bytes(buf[8..12].try_into().unwrap()),
        u32::from_le_bytes(buf[12..16].try_into().unwrap()),
    ])
}
