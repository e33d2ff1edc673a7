use proptest::prelude::*;

use reelcast_timing::{content_seconds, pacing_delay, PacingBounds, PhaseConfig};

fn bounds() -> PacingBounds {
    PacingBounds {
        min_delay_secs: 0.01,
        max_delay_secs: 0.5,
    }
}

proptest! {
    #[test]
    fn content_is_exact_remainder_when_target_exceeds_phases(
        intro in 0.0f64..30.0,
        final_secs in 0.0f64..30.0,
        extra in 0.001f64..600.0,
    ) {
        let phases = PhaseConfig { intro_secs: intro, final_secs };
        let target = intro + final_secs + extra;
        prop_assume!(target - intro - final_secs > 0.0);

        let content = content_seconds(target, phases).unwrap();
        prop_assert_eq!(content, target - intro - final_secs);
    }

    #[test]
    fn budget_fails_when_target_does_not_exceed_phases(
        intro in 0.0f64..30.0,
        final_secs in 0.0f64..30.0,
        shortfall in 0.01f64..1.0,
    ) {
        let phases = PhaseConfig { intro_secs: intro, final_secs };
        let target = (intro + final_secs) * (1.0 - shortfall);
        let err = content_seconds(target, phases).unwrap_err();
        prop_assert_eq!(err.kind(), "invalid_budget");
    }

    #[test]
    fn delay_always_within_bounds(content in 0.001f64..3600.0, units in 0usize..10_000_000) {
        let delay = pacing_delay(content, units, bounds());
        prop_assert!(delay >= 0.01);
        prop_assert!(delay <= 0.5);
    }

    #[test]
    fn delay_is_non_increasing_in_unit_count(
        content in 0.001f64..3600.0,
        a in 1usize..1_000_000,
        b in 1usize..1_000_000,
    ) {
        let (small, large) = if a <= b { (a, b) } else { (b, a) };
        let d_small = pacing_delay(content, small, bounds());
        let d_large = pacing_delay(content, large, bounds());
        prop_assert!(d_small >= d_large);
    }
}

#[test]
fn single_unit_and_huge_unit_counts_stay_in_range() {
    assert_eq!(pacing_delay(4.0, 1, bounds()), 0.5);
    assert_eq!(pacing_delay(4.0, usize::MAX, bounds()), 0.01);
}
