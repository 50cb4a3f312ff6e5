use std::io::Cursor;

use citrace_format::CtHeader;
use pica_cmdlist::{build_initial_state, command_header, pack_f24x4, BuildError};
use pica_regs::{RegisterStateMask, NUM_PICA_REGISTERS};

/// Builds the flat byte blob the initial-state tables live in.
#[derive(Default)]
struct Fixture {
    bytes: Vec<u8>,
}

impl Fixture {
    /// Append `words` and return their byte offset.
    fn words(&mut self, words: &[u32]) -> u32 {
        let offset = self.bytes.len() as u32;
        for word in words {
            self.bytes.extend_from_slice(&word.to_le_bytes());
        }
        offset
    }

    fn cursor(&self) -> Cursor<&[u8]> {
        Cursor::new(&self.bytes)
    }
}

fn empty_mask() -> RegisterStateMask {
    RegisterStateMask::from_lanes([0; NUM_PICA_REGISTERS])
}

#[test]
fn all_zero_header_builds_an_empty_list() {
    let fixture = Fixture::default();
    let header = CtHeader::default();

    let list = build_initial_state(&mut fixture.cursor(), &header, &empty_mask()).unwrap();
    assert!(list.is_empty());
}

#[test]
fn default_attributes_read_sequentially_and_pack_bit_exact() {
    let slot0 = [0x00AA_0001, 0x00BB_0002, 0x00CC_0003, 0x00DD_0004];
    let slot1 = [0x0011_0005, 0x0022_0006, 0x0033_0007, 0x0044_0008];

    let mut fixture = Fixture::default();
    let mut table = Vec::new();
    table.extend_from_slice(&slot0);
    table.extend_from_slice(&slot1);
    let offset = fixture.words(&table);

    let mut header = CtHeader::default();
    header.initial_state.default_attributes = offset;
    header.initial_state.default_attributes_size = 8;

    let list = build_initial_state(&mut fixture.cursor(), &header, &empty_mask()).unwrap();

    let [a0, a1, a2] = pack_f24x4(slot0);
    let [b0, b1, b2] = pack_f24x4(slot1);
    let attr_header = command_header(0x232, 0xF, 3);
    assert_eq!(
        &list.words()[..10],
        &[0, attr_header, a0, a1, a2, 1, attr_header, b0, b1, b2]
    );
    assert_eq!(list.len() % 4, 0);
}

#[test]
fn program_binary_uploads_verbatim_after_an_index_reset() {
    let mut fixture = Fixture::default();
    let offset = fixture.words(&[0xDEAD_0001, 0xDEAD_0002, 0xDEAD_0003]);

    let mut header = CtHeader::default();
    header.initial_state.vs_program_binary = offset;
    header.initial_state.vs_program_binary_size = 3;

    let list = build_initial_state(&mut fixture.cursor(), &header, &empty_mask()).unwrap();
    assert_eq!(
        &list.words()[..6],
        &[
            0,
            command_header(0x2CB, 0xF, 0),
            0xDEAD_0001,
            command_header(0x2CC, 0xF, 2),
            0xDEAD_0002,
            0xDEAD_0003,
        ]
    );
    assert_eq!(list.len() % 4, 0);
}

#[test]
fn float_uniforms_pack_every_group_under_a_single_header() {
    let group0 = [0x01, 0x02, 0x03, 0x04];
    let group1 = [0x05, 0x06, 0x07, 0x08];

    let mut fixture = Fixture::default();
    let mut table = Vec::new();
    table.extend_from_slice(&group0);
    table.extend_from_slice(&group1);
    let offset = fixture.words(&table);

    let mut header = CtHeader::default();
    header.initial_state.vs_float_uniforms = offset;
    header.initial_state.vs_float_uniforms_size = 8;

    let list = build_initial_state(&mut fixture.cursor(), &header, &empty_mask()).unwrap();

    let [a0, a1, a2] = pack_f24x4(group0);
    let [b0, b1, b2] = pack_f24x4(group1);
    assert_eq!(
        &list.words()[..9],
        &[
            0,
            command_header(0x2C0, 0xF, 0),
            a0,
            // One header for all groups: first word plus five extras.
            command_header(0x2C1, 0xF, 5),
            a1,
            a2,
            b0,
            b1,
            b2,
        ]
    );
    assert_eq!(list.len() % 4, 0);
}

#[test]
fn register_snapshot_skips_unmasked_indices_in_ascending_order() {
    let mut lanes = [0u8; NUM_PICA_REGISTERS];
    lanes[1] = 0xF;
    lanes[2] = 0x3;
    lanes[4] = 0xC;
    let mask = RegisterStateMask::from_lanes(lanes);

    let mut fixture = Fixture::default();
    let offset = fixture.words(&[10, 11, 12, 13, 14]);

    let mut header = CtHeader::default();
    header.initial_state.pica_registers = offset;
    header.initial_state.pica_registers_size = 5;

    let list = build_initial_state(&mut fixture.cursor(), &header, &mask).unwrap();
    assert_eq!(
        list.words(),
        &[
            11,
            command_header(1, 0xF, 0),
            12,
            command_header(2, 0x3, 0),
            14,
            command_header(4, 0xC, 0),
            // Padding repeats the trailing pair.
            14,
            command_header(4, 0xC, 0),
        ]
    );
}

#[test]
fn snapshot_replay_is_bounded_by_the_mask_table() {
    let mut fixture = Fixture::default();
    let snapshot = vec![0x5A5A_5A5A; NUM_PICA_REGISTERS + 0x10];
    let offset = fixture.words(&snapshot);

    let mut header = CtHeader::default();
    header.initial_state.pica_registers = offset;
    header.initial_state.pica_registers_size = (NUM_PICA_REGISTERS + 0x10) as u32;

    let list = build_initial_state(&mut fixture.cursor(), &header, &RegisterStateMask::pica())
        .unwrap();

    // No emitted header may address a register at or beyond the table end.
    let headers = list.words().chunks(2).map(|pair| pair[1]);
    for header_word in headers {
        assert!((header_word & 0xFFFF) < NUM_PICA_REGISTERS as u32);
    }
    assert_eq!(list.len() % 4, 0);
}

#[test]
fn truncated_snapshot_is_fatal() {
    let mut fixture = Fixture::default();
    let offset = fixture.words(&[1, 2]);

    let mut lanes = [0u8; NUM_PICA_REGISTERS];
    lanes[3] = 0xF;
    let mask = RegisterStateMask::from_lanes(lanes);

    let mut header = CtHeader::default();
    header.initial_state.pica_registers = offset;
    header.initial_state.pica_registers_size = 4;

    let err = build_initial_state(&mut fixture.cursor(), &header, &mask).unwrap_err();
    assert!(matches!(err, BuildError::Io(_)));
}

#[test]
fn zero_sized_tables_are_no_ops() {
    let mut fixture = Fixture::default();
    // Offsets point somewhere plausible but the sizes say "nothing here".
    let offset = fixture.words(&[0xFFFF_FFFF; 4]);

    let mut header = CtHeader::default();
    header.initial_state.vs_program_binary = offset;
    header.initial_state.gs_float_uniforms = offset;
    header.initial_state.default_attributes = offset;

    let list = build_initial_state(&mut fixture.cursor(), &header, &empty_mask()).unwrap();
    assert!(list.is_empty());
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        /// The finished list length is always a multiple of four words, for
        /// every combination of table sizes.
        #[test]
        fn list_length_is_always_submit_aligned(
            attr_slots in 0u32..4,
            vs_program in 0u32..9,
            gs_program in 0u32..9,
            vs_swizzle in 0u32..5,
            gs_swizzle in 0u32..5,
            vs_uniform_groups in 0u32..4,
            gs_uniform_groups in 0u32..4,
            snapshot_words in 0u32..0x80,
        ) {
            let mut fixture = Fixture::default();
            let mut header = CtHeader::default();
            let init = &mut header.initial_state;

            init.default_attributes = fixture.words(&vec![0x111; (attr_slots * 4) as usize]);
            init.default_attributes_size = attr_slots * 4;
            init.vs_program_binary = fixture.words(&vec![0x222; vs_program as usize]);
            init.vs_program_binary_size = vs_program;
            init.gs_program_binary = fixture.words(&vec![0x333; gs_program as usize]);
            init.gs_program_binary_size = gs_program;
            init.vs_swizzle_data = fixture.words(&vec![0x444; vs_swizzle as usize]);
            init.vs_swizzle_data_size = vs_swizzle;
            init.gs_swizzle_data = fixture.words(&vec![0x555; gs_swizzle as usize]);
            init.gs_swizzle_data_size = gs_swizzle;
            init.vs_float_uniforms = fixture.words(&vec![0x666; (vs_uniform_groups * 4) as usize]);
            init.vs_float_uniforms_size = vs_uniform_groups * 4;
            init.gs_float_uniforms = fixture.words(&vec![0x777; (gs_uniform_groups * 4) as usize]);
            init.gs_float_uniforms_size = gs_uniform_groups * 4;
            init.pica_registers = fixture.words(&vec![0x888; snapshot_words as usize]);
            init.pica_registers_size = snapshot_words;

            let list = build_initial_state(
                &mut fixture.cursor(),
                &header,
                &RegisterStateMask::pica(),
            ).unwrap();
            prop_assert_eq!(list.len() % 4, 0);
        }
    }
}
