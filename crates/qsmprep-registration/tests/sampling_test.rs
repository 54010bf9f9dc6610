use proptest::prelude::*;
use qsmprep_registration::SamplingStrategy;

proptest! {
    #[test]
    fn test_random_draw_is_bounded_distinct_and_repeatable(
        voxels in 1usize..50_000,
        fraction in 0.001f64..1.0,
        seed in any::<u64>(),
        min_samples in 0usize..4096,
        level in 0usize..4
    ) {
        let strategy = SamplingStrategy::Random { fraction, seed, min_samples };
        let picked = strategy.draw(voxels, level);

        prop_assert_eq!(picked.len(), strategy.sample_count(voxels));
        prop_assert!(picked.len() >= min_samples.min(voxels));
        prop_assert!(picked.len() <= voxels);
        prop_assert!(picked.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(picked.iter().all(|&i| i < voxels));
        prop_assert_eq!(picked, strategy.draw(voxels, level));
    }

    #[test]
    fn test_full_draw_covers_every_voxel(voxels in 1usize..10_000) {
        let picked = SamplingStrategy::Full.draw(voxels, 0);
        prop_assert_eq!(picked, (0..voxels).collect::<Vec<_>>());
    }
}
