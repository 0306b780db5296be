use criterion::{criterion_group, criterion_main, Criterion, black_box};

use glam::{UVec3, Vec3};

use lithos::field::{NoiseSettings, ScalarField, sample_noise_map};
use lithos::mesh::{MarchingCubes, TopologyMode, planet_lattice};
use lithos::streaming::{ChunkIndex, TerrainChunk, TerrainSettings};

fn sphere_lattice(samples_per_axis: u32, radius: f32) -> ScalarField {
    let half = (samples_per_axis - 1) as f32 * 0.5;
    ScalarField::from_fn(UVec3::splat(samples_per_axis), |x, y, z| {
        let p = Vec3::new(x as f32, y as f32, z as f32) - Vec3::splat(half);
        p.length() - radius
    })
}

fn bench_extract_17(c: &mut Criterion) {
    let lattice = sphere_lattice(17, 6.0);
    let mc = MarchingCubes::new(TopologyMode::TopologicallyControlled);

    c.bench_function("extract_sphere_17", |b| {
        b.iter(|| mc.extract(black_box(&lattice), 0.0));
    });
}

fn bench_extract_33(c: &mut Criterion) {
    let lattice = sphere_lattice(33, 14.0);
    let mc = MarchingCubes::new(TopologyMode::TopologicallyControlled);

    c.bench_function("extract_sphere_33", |b| {
        b.iter(|| mc.extract(black_box(&lattice), 0.0));
    });
}

fn bench_extract_classic_33(c: &mut Criterion) {
    let lattice = sphere_lattice(33, 14.0);
    let mc = MarchingCubes::new(TopologyMode::Classic);

    c.bench_function("extract_sphere_classic_33", |b| {
        b.iter(|| mc.extract(black_box(&lattice), 0.0));
    });
}

fn bench_planet_lattice(c: &mut Criterion) {
    let noise = sample_noise_map(
        UVec3::splat(33),
        Vec3::splat(-16.0),
        &NoiseSettings::default(),
    );

    c.bench_function("planet_lattice_33", |b| {
        b.iter(|| planet_lattice(black_box(&noise), Vec3::splat(-16.0), 14.0, 0.05, 1));
    });
}

fn bench_noise_sampling(c: &mut Criterion) {
    let settings = NoiseSettings::default();

    c.bench_function("noise_map_17", |b| {
        b.iter(|| sample_noise_map(UVec3::splat(17), black_box(Vec3::splat(-8.0)), &settings));
    });
}

fn bench_octree_insert_get(c: &mut Criterion) {
    let settings = TerrainSettings {
        chunk_size: 16,
        radius: 90.0,
        ..TerrainSettings::default()
    };

    c.bench_function("octree_insert_get_512", |b| {
        b.iter(|| {
            let mut index = ChunkIndex::new(&settings);
            for z in -4..4 {
                for y in -4..4 {
                    for x in -4..4 {
                        let coord = glam::IVec3::new(x, y, z);
                        index.insert(coord, TerrainChunk::new(coord, 16, 5));
                    }
                }
            }
            for z in -4..4 {
                for y in -4..4 {
                    for x in -4..4 {
                        black_box(index.get(glam::IVec3::new(x, y, z)));
                    }
                }
            }
        });
    });
}

criterion_group!(
    benches,
    bench_extract_17,
    bench_extract_33,
    bench_extract_classic_33,
    bench_planet_lattice,
    bench_noise_sampling,
    bench_octree_insert_get,
);
criterion_main!(benches);
