use ptiles_core::{
    classes::ClassMap,
    cloud::{ExtraFeature, FeatureSchema, PointCloud},
    nalgebra::Vector3,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Creates `count` uniformly distributed points in `[0; extent)` horizontally and `[0; 5)` vertically, with
/// classification codes `0..4` and a single `intensity` feature
pub(crate) fn random_cloud(count: usize, extent: f64, seed: u64) -> PointCloud {
    let mut rng = StdRng::seed_from_u64(seed);
    let schema = FeatureSchema::new(vec![ExtraFeature::new("intensity", 255.0)]);
    let mut cloud = PointCloud::with_capacity(count, schema);
    for _ in 0..count {
        let position = Vector3::new(
            rng.gen_range(0.0..extent),
            rng.gen_range(0.0..extent),
            rng.gen_range(0.0..5.0),
        );
        cloud
            .push(position, rng.gen_range(0..4), &[rng.gen_range(0.0..255.0)])
            .expect("Invalid number of extra features");
    }
    cloud
}

pub(crate) fn test_classes() -> ClassMap {
    ClassMap::new(vec![0, 1, 2, 3]).expect("Invalid class map")
}
