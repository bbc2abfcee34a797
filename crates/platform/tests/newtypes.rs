//! Type system enforcement tests for capture domain newtypes.
//! These newtypes prevent common capture configuration bugs at compile time.

// ── ChannelMask ──────────────────────────────────────────────────────────────

#[test]
fn channel_mask_rejects_empty() {
    use platform::audio_types::ChannelMask;
    assert!(ChannelMask::try_new(0).is_err(), "an empty mask captures nothing");
}

#[test]
fn channel_mask_rejects_lanes_above_three() {
    use platform::audio_types::ChannelMask;
    assert!(ChannelMask::try_new(0x10).is_err());
    assert!(ChannelMask::try_new(0xFF).is_err());
}

#[test]
fn channel_mask_reports_lanes_in_order() {
    use platform::audio_types::ChannelMask;
    let mask = ChannelMask::try_new(0b1010).unwrap();
    let lanes: Vec<u8> = mask.lanes().collect();
    assert_eq!(lanes, vec![1, 3]);
    assert_eq!(mask.count(), 2);
    assert_eq!(mask.lowest(), 1);
}

#[test]
fn channel_mask_pair_is_lanes_zero_and_one() {
    use platform::audio_types::ChannelMask;
    assert!(ChannelMask::PAIR_01.contains(0));
    assert!(ChannelMask::PAIR_01.contains(1));
    assert!(!ChannelMask::PAIR_01.contains(2));
}

#[test]
fn channel_mask_is_one_byte() {
    use platform::audio_types::ChannelMask;
    assert_eq!(core::mem::size_of::<ChannelMask>(), 1);
}

// ── Phase ────────────────────────────────────────────────────────────────────

#[test]
fn phase_follows_toggle_parity() {
    use platform::audio_types::Phase;
    assert_eq!(Phase::from_toggle(0), Phase::Ping);
    assert_eq!(Phase::from_toggle(1), Phase::Pong);
    assert_eq!(Phase::from_toggle(u32::MAX), Phase::Pong);
}

#[test]
fn phase_other_alternates() {
    use platform::audio_types::Phase;
    assert_eq!(Phase::Ping.other(), Phase::Pong);
    assert_eq!(Phase::Pong.other().other(), Phase::Pong);
    assert_eq!(Phase::Ping.index(), 0);
    assert_eq!(Phase::Pong.index(), 1);
}

// ── SampleWidth ──────────────────────────────────────────────────────────────

#[test]
fn sample_width_bytes() {
    use platform::audio_types::SampleWidth;
    assert_eq!(SampleWidth::Bytes2.bytes(), 2);
    assert_eq!(SampleWidth::Bytes4.bytes(), 4);
}

// ── VolumePercent ────────────────────────────────────────────────────────────

#[test]
fn volume_percent_new_clamps_over_100() {
    use platform::audio_types::VolumePercent;
    let v = VolumePercent::new(150);
    assert_eq!(v.get(), 100, "VolumePercent::new(150) should clamp to 100");
}

#[test]
fn volume_percent_try_new_rejects_over_100() {
    use platform::audio_types::VolumePercent;
    assert!(VolumePercent::try_new(101).is_err());
    assert!(VolumePercent::try_new(255).is_err());
}

#[test]
fn volume_full_scale_is_identity() {
    use platform::audio_types::VolumePercent;
    assert_eq!(VolumePercent::FULL.scale(i16::MIN), i16::MIN);
    assert_eq!(VolumePercent::FULL.scale(12_345), 12_345);
}

#[test]
fn volume_half_scale_truncates_toward_zero() {
    use platform::audio_types::VolumePercent;
    let half = VolumePercent::new(50);
    assert_eq!(half.scale(101), 50);
    assert_eq!(half.scale(-101), -50);
}
