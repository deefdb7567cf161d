//! Property-based round-trip checks for virtual-time conversions.

use proptest::prelude::*;
use retrysched_core::{Clock, VirtualClock};
use std::time::{Duration, Instant};

proptest! {
    #[test]
    fn virtual_gap_is_nonzero_iff_endpoints_differ(
        factor in 0.01f64..100.0,
        nanos in 0u64..1_000_000_000,
    ) {
        let clock = VirtualClock::new(factor);
        let start = Instant::now();
        let end = start + Duration::from_nanos(nanos);
        let gap = clock.virtual_gap(start, end);
        prop_assert_eq!(gap.is_zero(), nanos == 0);
    }

    #[test]
    fn add_virtual_interval_is_monotonic_in_duration(
        factor in 0.01f64..100.0,
        a_nanos in 0u64..1_000_000_000,
        b_nanos in 0u64..1_000_000_000,
    ) {
        let clock = VirtualClock::new(factor);
        let start = Instant::now();
        let end_a = clock.add_virtual_interval(start, Duration::from_nanos(a_nanos));
        let end_b = clock.add_virtual_interval(start, Duration::from_nanos(b_nanos));
        if a_nanos < b_nanos {
            prop_assert!(end_a <= end_b);
        }
    }
}
