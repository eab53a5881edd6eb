//! Domain layout: FMMU packing into datagram pairs, working counter
//! expectations and PDO entry registration.

mod util;

use arbitrary::Arbitrary;
use ethertide::{
    Command, Direction, Domain, FmmuConfig, PdoEntryIndex, PdoEntryMapping, PdoEntryOffset,
    PdoEntryRegistration, SubDeviceConfig, MAX_PDU_DATA,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use util::init_logger;

const BASE: u32 = 0x0001_0000;

fn configs(count: usize) -> Vec<Arc<SubDeviceConfig>> {
    (0..count)
        .map(|id| SubDeviceConfig::new(id, 0, id as u16, 0x0000_0002, 0x0bad_cafe))
        .collect()
}

#[test]
fn two_pair_split() {
    init_logger();

    let all = configs(1);
    let config = &all[0];

    let mut domain = Domain::new(0);

    // 800 + 600 fit into one datagram; the third mapping would exceed the
    // payload cap and opens the second pair
    for (size, direction) in [
        (800, Direction::Output),
        (600, Direction::Input),
        (800, Direction::Output),
        (100, Direction::Input),
    ] {
        domain
            .add_fmmu_config(FmmuConfig::new(config, direction, 0x1000, size))
            .unwrap();
    }

    domain.finish(BASE).unwrap();

    assert_eq!(domain.size(), 2300);

    let pairs = domain.datagram_pairs();

    assert_eq!(pairs.len(), 2);

    assert_eq!(pairs[0].range(), 0..1400);
    assert_eq!(pairs[0].command(), Command::lrw(BASE));
    assert_eq!(pairs[0].expected_working_counter(), 3);

    assert_eq!(pairs[1].range(), 1400..2300);
    assert_eq!(pairs[1].command(), Command::lrw(BASE + 1400));
    assert_eq!(pairs[1].expected_working_counter(), 3);

    assert_eq!(domain.expected_working_counter(), 6);

    // Logical addresses are patched by the base address
    let logical: Vec<u32> = domain
        .fmmu_configs()
        .iter()
        .map(FmmuConfig::logical_start_address)
        .collect();

    assert_eq!(logical, [BASE, BASE + 800, BASE + 1400, BASE + 2200]);
}

#[test]
fn command_type_follows_directions() {
    init_logger();

    let all = configs(1);
    let config = &all[0];

    // Output only → LWR
    let mut outputs = Domain::new(0);

    outputs
        .add_fmmu_config(FmmuConfig::new(config, Direction::Output, 0x1000, 8))
        .unwrap();
    outputs.finish(0).unwrap();

    assert_eq!(outputs.datagram_pairs()[0].command(), Command::lwr(0));
    assert_eq!(outputs.datagram_pairs()[0].expected_working_counter(), 1);

    // Input only → LRD
    let mut inputs = Domain::new(1);

    inputs
        .add_fmmu_config(FmmuConfig::new(config, Direction::Input, 0x1100, 8))
        .unwrap();
    inputs.finish(0).unwrap();

    assert_eq!(inputs.datagram_pairs()[0].command(), Command::lrd(0));
    assert_eq!(inputs.datagram_pairs()[0].expected_working_counter(), 1);

    // Mixed → LRW with 2 * outputs + inputs
    let mut mixed = Domain::new(2);

    mixed
        .add_fmmu_config(FmmuConfig::new(config, Direction::Output, 0x1000, 8))
        .unwrap();
    mixed
        .add_fmmu_config(FmmuConfig::new(config, Direction::Input, 0x1100, 8))
        .unwrap();
    mixed.finish(0).unwrap();

    assert_eq!(mixed.datagram_pairs()[0].command(), Command::lrw(0));
    assert_eq!(mixed.datagram_pairs()[0].expected_working_counter(), 3);
}

#[test]
fn subdevice_counted_once_per_direction_per_datagram() {
    init_logger();

    let all = configs(2);

    let mut domain = Domain::new(0);

    // Two output mappings of the same config in the same datagram count once
    domain
        .add_fmmu_config(FmmuConfig::new(&all[0], Direction::Output, 0x1000, 4))
        .unwrap();
    domain
        .add_fmmu_config(FmmuConfig::new(&all[0], Direction::Output, 0x1004, 4))
        .unwrap();
    // A second config bumps the count again
    domain
        .add_fmmu_config(FmmuConfig::new(&all[1], Direction::Output, 0x1000, 4))
        .unwrap();

    domain.finish(0).unwrap();

    assert_eq!(domain.datagram_pairs().len(), 1);
    assert_eq!(domain.expected_working_counter(), 2);
}

#[test]
fn fmmus_are_frozen_after_finish() {
    init_logger();

    let all = configs(1);
    let config = &all[0];

    let mut domain = Domain::new(0);

    domain
        .add_fmmu_config(FmmuConfig::new(config, Direction::Input, 0x1000, 4))
        .unwrap();

    domain.finish(0).unwrap();

    assert!(domain
        .add_fmmu_config(FmmuConfig::new(config, Direction::Input, 0x1004, 4))
        .is_err());
}

#[test]
fn oversized_fmmu_is_rejected() {
    init_logger();

    let all = configs(1);
    let config = &all[0];

    let mut domain = Domain::new(0);

    assert!(domain
        .add_fmmu_config(FmmuConfig::new(
            config,
            Direction::Input,
            0x1000,
            MAX_PDU_DATA + 1
        ))
        .is_err());
}

#[test]
fn register_pdo_entry_list_resolves_offsets() {
    init_logger();

    let all = configs(2);

    let mut domain = Domain::new(0);

    domain
        .add_fmmu_config(FmmuConfig::with_entries(
            &all[0],
            Direction::Output,
            0x1000,
            4,
            vec![
                PdoEntryMapping {
                    entry: PdoEntryIndex {
                        index: 0x7000,
                        subindex: 1,
                    },
                    bit_offset: 0,
                    bit_len: 16,
                },
                PdoEntryMapping {
                    entry: PdoEntryIndex {
                        index: 0x7000,
                        subindex: 2,
                    },
                    bit_offset: 16,
                    bit_len: 1,
                },
            ],
        ))
        .unwrap();
    domain
        .add_fmmu_config(FmmuConfig::with_entries(
            &all[1],
            Direction::Input,
            0x1100,
            2,
            vec![PdoEntryMapping {
                entry: PdoEntryIndex {
                    index: 0x6000,
                    subindex: 1,
                },
                bit_offset: 3,
                bit_len: 1,
            }],
        ))
        .unwrap();

    domain.finish(BASE).unwrap();

    let registration = |config: &Arc<SubDeviceConfig>, index, subindex| PdoEntryRegistration {
        alias: config.alias(),
        position: config.position(),
        vendor_id: config.vendor_id(),
        product_id: config.product_id(),
        entry: PdoEntryIndex { index, subindex },
    };

    let offsets = domain
        .register_pdo_entry_list(
            &all,
            &[
                registration(&all[0], 0x7000, 1),
                registration(&all[0], 0x7000, 2),
                registration(&all[1], 0x6000, 1),
                // Legacy sentinel: a zero index terminates the list
                registration(&all[0], 0x0000, 0),
                registration(&all[0], 0xffff, 1),
            ],
        )
        .unwrap();

    assert_eq!(
        offsets,
        [
            PdoEntryOffset { byte: 0, bit: 0 },
            PdoEntryOffset { byte: 2, bit: 0 },
            PdoEntryOffset { byte: 4, bit: 3 },
        ]
    );
}

#[test]
fn unknown_pdo_entry_is_an_error() {
    init_logger();

    let all = configs(1);

    let mut domain = Domain::new(0);

    domain
        .add_fmmu_config(FmmuConfig::new(&all[0], Direction::Input, 0x1000, 2))
        .unwrap();

    domain.finish(0).unwrap();

    let missing = PdoEntryRegistration {
        alias: 0,
        position: 0,
        vendor_id: 0x0000_0002,
        product_id: 0x0bad_cafe,
        entry: PdoEntryIndex {
            index: 0x6000,
            subindex: 1,
        },
    };

    assert!(domain.register_pdo_entry_list(&all, &[missing]).is_err());
}

/// Property-test input: a plausible FMMU layout.
#[derive(Arbitrary, Debug)]
struct Layout {
    fmmus: Vec<(u16, bool, u8)>,
}

#[test]
fn layout_properties() {
    init_logger();

    heckcheck::check(|layout: Layout| {
        let all = configs(4);

        let mut domain = Domain::new(0);

        // Cap the walk at a sane mapping count and size so the test stays fast
        for &(size, is_input, config) in layout.fmmus.iter().take(24) {
            let size = usize::from(size) % 1200 + 1;
            let direction = if is_input {
                Direction::Input
            } else {
                Direction::Output
            };
            let config = &all[usize::from(config) % all.len()];

            domain
                .add_fmmu_config(FmmuConfig::new(config, direction, 0x1000, size))
                .expect("add fmmu");
        }

        domain.finish(BASE).expect("finish");

        let pairs = domain.datagram_pairs();

        // Pairs tile [0, size) exactly: contiguous, increasing, no overlap
        let mut cursor = 0;

        for pair in pairs {
            assert_eq!(pair.range().start, cursor, "gap or overlap in tiling");
            assert!(pair.range().len() <= MAX_PDU_DATA, "pair exceeds payload cap");
            assert_eq!(
                pair.logical_start_address(),
                BASE + pair.range().start as u32
            );

            cursor = pair.range().end;
        }

        assert_eq!(cursor, domain.size(), "pairs do not cover the image");

        // No two adjacent pairs could be merged without busting the cap
        for window in pairs.windows(2) {
            assert!(
                window[0].range().len() + window[1].range().len() > MAX_PDU_DATA,
                "adjacent pairs {:?} and {:?} are mergeable",
                window[0].range(),
                window[1].range()
            );
        }

        // Every mapping is contained in exactly one pair, the one it points at
        for fmmu in domain.fmmu_configs() {
            let start = (fmmu.logical_start_address() - BASE) as usize;
            let end = start + fmmu.data_size();

            let containing: Vec<usize> = pairs
                .iter()
                .enumerate()
                .filter(|(_, pair)| pair.range().start <= start && end <= pair.range().end)
                .map(|(i, _)| i)
                .collect();

            assert_eq!(containing.len(), 1, "mapping not in exactly one pair");
            assert_eq!(Some(containing[0]), fmmu.pair_index());
        }

        // Expected working counter recomputed independently per pair:
        // distinct (config, direction) contributors, outputs weighted double
        let recomputed: u16 = pairs
            .iter()
            .enumerate()
            .map(|(i, _)| {
                let members: Vec<_> = domain
                    .fmmu_configs()
                    .iter()
                    .filter(|fmmu| fmmu.pair_index() == Some(i))
                    .collect();

                let distinct = |direction| {
                    let mut ids: Vec<usize> = members
                        .iter()
                        .filter(|fmmu| fmmu.direction() == direction)
                        .map(|fmmu| fmmu.config_id())
                        .collect();

                    ids.sort_unstable();
                    ids.dedup();

                    ids.len() as u16
                };

                let outputs = distinct(Direction::Output);
                let inputs = distinct(Direction::Input);

                match (outputs, inputs) {
                    (0, inputs) => inputs,
                    (outputs, 0) => outputs,
                    (outputs, inputs) => outputs * 2 + inputs,
                }
            })
            .sum();

        assert_eq!(domain.expected_working_counter(), recomputed);

        Ok(())
    });
}
