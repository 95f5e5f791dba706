use comic_relay::delivery::{BandCount, BandPlan, BandSegment, RasterImage, reconstruct, scramble};
use proptest::prelude::*;

fn intervals_tile(mut intervals: Vec<(u32, u32)>, height: u32) -> bool {
    intervals.sort_unstable();
    let mut cursor = 0u32;
    for (start, len) in intervals {
        if start != cursor || len == 0 {
            return false;
        }
        cursor += len;
    }
    cursor == height
}

fn gradient(width: u32, height: u32) -> RasterImage {
    let pixels = (0..height)
        .flat_map(|y| {
            (0..width).flat_map(move |x| {
                [(y % 256) as u8, (y / 256) as u8, (x % 256) as u8]
            })
        })
        .collect();
    RasterImage::from_rgb8(width, height, pixels).expect("valid gradient")
}

proptest! {
    #[test]
    fn prop_destination_bands_tile_the_image(height in 1..4000u32, num in 1..300u32) {
        prop_assume!(num <= height);
        let plan = BandPlan::compute(height, BandCount::new(num)).expect("plan");

        prop_assert_eq!(plan.segments().len(), num as usize);
        let total: u32 = plan.segments().iter().map(|s| s.len).sum();
        prop_assert_eq!(total, height);
        prop_assert!(intervals_tile(
            plan.segments().iter().map(|s| (s.dst_start, s.len)).collect(),
            height
        ));
    }

    #[test]
    fn prop_source_bands_tile_the_image(height in 1..4000u32, num in 1..300u32) {
        prop_assume!(num <= height);
        let plan = BandPlan::compute(height, BandCount::new(num)).expect("plan");

        prop_assert!(intervals_tile(
            plan.segments().iter().map(|s| (s.src_start, s.len)).collect(),
            height
        ));
    }

    #[test]
    fn prop_reconstruct_inverts_scramble(width in 1..8u32, height in 1..300u32, num in 0..64u32) {
        prop_assume!(num <= height);
        let original = gradient(width, height);

        let scrambled = scramble(original.clone(), BandCount::new(num)).expect("scramble");
        let restored = reconstruct(scrambled, BandCount::new(num)).expect("reconstruct");

        prop_assert_eq!(restored.as_bytes(), original.as_bytes());
    }

    #[test]
    fn prop_too_many_bands_is_rejected(height in 1..500u32, extra in 1..50u32) {
        let result = BandPlan::compute(height, BandCount::new(height + extra));
        prop_assert!(result.is_err());
    }
}

#[test]
fn remainder_lands_in_first_band() {
    let plan = BandPlan::compute(10, BandCount::new(3)).expect("plan");

    assert_eq!(
        plan.segments(),
        &[
            BandSegment { src_start: 6, len: 4, dst_start: 0 },
            BandSegment { src_start: 3, len: 3, dst_start: 4 },
            BandSegment { src_start: 0, len: 3, dst_start: 7 },
        ]
    );
}

#[test]
fn chapter_page_round_trip() {
    let original = gradient(4, 1000);
    let num = BandCount::new(7);

    let scrambled = scramble(original.clone(), num).expect("scramble");
    assert_ne!(scrambled.as_bytes(), original.as_bytes());

    let restored = reconstruct(scrambled, num).expect("reconstruct");
    assert_eq!(restored.as_bytes(), original.as_bytes());
}
