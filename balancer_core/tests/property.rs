mod common;

use balancer_core::mocks::FlatModel;
use balancer_core::{BalanceCfg, Balancer};
use common::{SharedSource, SpySwitches};
use proptest::prelude::*;

fn build(source: SharedSource, cells: usize, margin_v: f32) -> Balancer {
    Balancer::builder()
        .with_voltage_source(source)
        .with_switch_driver(SpySwitches::default())
        .with_cell_count(cells)
        .with_cell_model(|| FlatModel(0))
        .with_config(BalanceCfg {
            error_margin_v: margin_v,
            ..BalanceCfg::default()
        })
        .build()
        .expect("build balancer")
}

fn arb_pack() -> impl Strategy<Value = Vec<i32>> {
    // Realistic lithium cell window in millivolts
    prop::collection::vec(3000..4400i32, 1..=6)
}

proptest! {
    /// The reference cell is never bled, and no bit above the configured
    /// cell count is ever set.
    #[test]
    fn pattern_never_bleeds_reference_or_phantom_cells(
        pack in arb_pack(),
        margin_mv in 0u32..200,
    ) {
        let cells = pack.len();
        let source = SharedSource::new(&pack);
        let mut b = build(source.clone(), cells, margin_mv as f32 / 1000.0);

        b.power_on().expect("power on");
        source.settle();
        b.tick().expect("tick");

        let pattern = b.pattern();
        prop_assert_eq!(pattern & (1 << b.min_cell()), 0);
        prop_assert_eq!(pattern >> cells, 0);
    }

    /// A fresh attempt turns a cell on exactly when its voltage exceeds the
    /// lowest cell by more than half the tolerance (rounded up).
    #[test]
    fn fresh_attempt_matches_threshold_rule(
        pack in arb_pack(),
        margin_mv in 0i32..200,
    ) {
        let cells = pack.len();
        let source = SharedSource::new(&pack);
        let mut b = build(source.clone(), cells, margin_mv as f32 / 1000.0);

        b.power_on().expect("power on");
        source.settle();
        b.tick().expect("tick");

        let vmin = *pack.iter().min().expect("non-empty pack");
        let half = (margin_mv + 1) / 2;
        let spread = pack.iter().any(|&v| v - vmin > margin_mv);

        if !spread {
            // Already within tolerance: the attempt short-circuits into
            // power-off and no pattern is ever applied.
            prop_assert_eq!(b.pattern(), 0);
            prop_assert!(!b.is_powered_on());
        } else {
            let mut expected = 0u8;
            for (c, &v) in pack.iter().enumerate() {
                if v > vmin + half {
                    expected |= 1 << c;
                }
            }
            prop_assert_eq!(b.pattern(), expected);
            prop_assert!(b.is_powered_on());
        }
    }

    /// With constant readings the pattern computed on the first tick never
    /// changes on later ticks.
    #[test]
    fn constant_readings_hold_the_pattern(pack in arb_pack()) {
        let source = SharedSource::new(&pack);
        let mut b = build(source.clone(), pack.len(), 0.02);

        b.power_on().expect("power on");
        source.settle();
        b.tick().expect("tick");
        let first = b.pattern();

        for _ in 0..5 {
            source.settle();
            b.tick().expect("tick");
            prop_assert_eq!(b.pattern(), first);
        }
    }
}
