//! Property-based tests for the control store and engine configuration
//!
//! These tests use proptest to check the version counter and partition
//! sizing across many random write sequences and layouts.

use proptest::prelude::*;
use reverb_core::params::ids;
use reverb_core::{ParameterSnapshot, ParameterSource};
use reverb_engine::{ControlHandle, EngineConfig};
use std::collections::HashMap;

const KEYS: [&str; 4] = [ids::WET_RATIO, ids::OUT_GAIN, ids::IR_GAIN, ids::PREDELAY];

fn writes() -> impl Strategy<Value = Vec<(usize, f32)>> {
    // Small value set so repeated writes of the same value are common
    prop::collection::vec((0..KEYS.len(), prop_oneof![Just(0.0f32), Just(0.5), Just(1.0)]), 0..64)
}

proptest! {
    /// Property: the version grows by exactly one per value-changing write
    #[test]
    fn version_counts_changing_writes(writes in writes()) {
        let controls = ControlHandle::new();
        let defaults = ParameterSnapshot::defaults();
        let mut expected: HashMap<&str, f32> = KEYS
            .iter()
            .map(|&key| (key, defaults.float(key).unwrap()))
            .collect();

        let mut changes = 0;
        for &(index, value) in &writes {
            let key = KEYS[index];
            if expected[key] != value {
                changes += 1;
                expected.insert(key, value);
            }
            controls.set_float(key, value).unwrap();
        }

        prop_assert_eq!(controls.version(), 1 + changes);
    }

    /// Property: a snapshot taken after the writes holds the last value of each key
    #[test]
    fn snapshot_holds_last_writes(writes in writes()) {
        let controls = ControlHandle::new();
        let mut last: HashMap<&str, f32> = HashMap::new();
        for &(index, value) in &writes {
            controls.set_float(KEYS[index], value).unwrap();
            last.insert(KEYS[index], value);
        }

        // Version 0 is never current, so an uncontended store always answers
        let (version, snapshot) = controls.try_snapshot(0).unwrap();
        prop_assert_eq!(version, controls.version());
        for (key, value) in last {
            prop_assert_eq!(snapshot.float(key).unwrap(), value);
        }
        prop_assert!(controls.try_snapshot(version).is_none());
    }

    /// Property: partitions are powers of two covering the block, never below the minimum
    #[test]
    fn partition_covers_block(
        max_block_size in 1usize..8_192,
        fixed in prop_oneof![Just(0usize), Just(64), Just(256), Just(1_024)]
    ) {
        let config = EngineConfig { partition_size: fixed, ..EngineConfig::default() };
        let partition = config.partition_for(max_block_size);

        prop_assert!(partition.is_power_of_two());
        prop_assert!(partition >= reverb_dsp::stages::MIN_PARTITION_SIZE);
        if fixed == 0 {
            prop_assert!(partition >= max_block_size);
        } else {
            prop_assert_eq!(partition, fixed);
        }
    }
}
