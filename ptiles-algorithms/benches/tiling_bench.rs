use criterion::{criterion_group, criterion_main, Criterion};
use ptiles_algorithms::{merge::merge_small_blocks, partition::partition, resample::resample_partition};
use ptiles_core::{
    cloud::{ExtraFeature, FeatureSchema, PointCloud},
    grid::{GridSpec, OffsetPass},
    nalgebra::Vector3,
};
use rand::{distributions::Uniform, rngs::StdRng, Rng, SeedableRng};

const NUM_POINTS_SMALL: usize = 10_000;
const NUM_POINTS_BIG: usize = 200_000;

fn get_dummy_cloud(num_points: usize) -> PointCloud {
    let mut rng = StdRng::seed_from_u64(num_points as u64);
    let schema = FeatureSchema::new(vec![ExtraFeature::new("intensity", 65535.0)]);
    let mut cloud = PointCloud::with_capacity(num_points, schema);
    for _ in 0..num_points {
        let position = Vector3::new(
            rng.sample(Uniform::new(0.0, 100.0)),
            rng.sample(Uniform::new(0.0, 100.0)),
            rng.sample(Uniform::new(0.0, 20.0)),
        );
        cloud
            .push(
                position,
                rng.sample(Uniform::new(0u8, 8)),
                &[rng.sample(Uniform::new(0.0, 65535.0))],
            )
            .expect("Invalid number of extra features");
    }
    cloud
}

fn bench_tiling(cloud: &PointCloud) {
    let grid = GridSpec::new(10.0, &cloud.bounds().expect("Cloud is empty"))
        .expect("Invalid block size");
    let mut blocks = partition(cloud, &grid, OffsetPass::Half);
    merge_small_blocks(&mut blocks, 819);
    resample_partition(cloud, blocks, 0.25, 0);
}

fn bench(c: &mut Criterion) {
    let small_cloud = get_dummy_cloud(NUM_POINTS_SMALL);
    let big_cloud = get_dummy_cloud(NUM_POINTS_BIG);

    c.bench_function("partition_small", |b| {
        let grid = GridSpec::new(10.0, &small_cloud.bounds().expect("Cloud is empty"))
            .expect("Invalid block size");
        b.iter(|| partition(&small_cloud, &grid, OffsetPass::Zero))
    });
    c.bench_function("tiling_small", |b| b.iter(|| bench_tiling(&small_cloud)));
    c.bench_function("tiling_big", |b| b.iter(|| bench_tiling(&big_cloud)));
}

criterion_group! {
    name = tiling;
    config = Criterion::default().sample_size(10);
    targets = bench
}
criterion_main!(tiling);
