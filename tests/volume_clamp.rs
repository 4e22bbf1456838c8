//! Volume command regression tests
//!
//! MPD rejects `setvol` outside 0..=100 with an ACK, so out-of-range
//! requests are clamped before they reach the wire.

use mpd_link::mpd::commands::set_volume;

// =============================================================================
// In range
// =============================================================================

#[test]
fn in_range_values_pass_through() {
    assert_eq!(set_volume(0), "setvol 0");
    assert_eq!(set_volume(42), "setvol 42");
    assert_eq!(set_volume(100), "setvol 100");
}

// =============================================================================
// Out of range
// =============================================================================

#[test]
fn negative_volume_clamps_to_zero() {
    assert_eq!(set_volume(-1), "setvol 0");
    assert_eq!(set_volume(-5), "setvol 0");
    assert_eq!(set_volume(-12), "setvol 0");
}

#[test]
fn volume_above_max_clamps_to_100() {
    assert_eq!(set_volume(101), "setvol 100");
    assert_eq!(set_volume(150), "setvol 100");
    assert_eq!(set_volume(250), "setvol 100");
}

#[test]
fn extreme_values_do_not_overflow() {
    assert_eq!(set_volume(i32::MIN), "setvol 0");
    assert_eq!(set_volume(i32::MAX), "setvol 100");
}
