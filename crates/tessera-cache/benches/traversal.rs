use criterion::{Criterion, black_box, criterion_group, criterion_main};
use glam::{DMat4, DVec3};
use tessera_cache::{
    CacheConfig, ImageTile, ManualProvider, NoopBuilder, QuadtreeCache, TileLayout, ViewDescriptor,
};

fn perspective_view(eye: DVec3) -> ViewDescriptor {
    let view = DMat4::look_at_rh(eye, DVec3::new(eye.x + 200.0, eye.y + 200.0, 0.0), DVec3::Z);
    let proj = DMat4::perspective_rh_gl(std::f64::consts::FRAC_PI_3, 16.0 / 9.0, 0.5, 50_000.0);
    let ppu = ViewDescriptor::perspective_pixels_per_unit(1080.0, std::f64::consts::FRAC_PI_3);
    ViewDescriptor::from_view_projection(proj * view, eye, ppu)
}

fn loaded_cache() -> QuadtreeCache<ManualProvider<2, ImageTile>, NoopBuilder> {
    let layout = TileLayout::new(DVec3::ZERO, DVec3::new(16_384.0, 16_384.0, 0.0));
    let config = CacheConfig {
        max_concurrent_requests: 4096,
        ..CacheConfig::default()
    };
    let mut cache = QuadtreeCache::new(config, layout, ManualProvider::new(0, 14), NoopBuilder)
        .expect("valid cache");
    let view = perspective_view(DVec3::new(4000.0, 4000.0, 150.0));
    for _ in 0..4 {
        cache.update(&view);
        cache
            .provider_mut()
            .complete_all(|_| Ok(ImageTile::solid(1, 1, [0, 0, 0, 255])));
    }
    cache
}

fn bench_steady_frame(c: &mut Criterion) {
    let mut cache = loaded_cache();
    let view = perspective_view(DVec3::new(4000.0, 4000.0, 150.0));
    c.bench_function("steady_frame", |b| {
        b.iter(|| black_box(cache.update(black_box(&view)).selected))
    });
}

fn bench_moving_frame(c: &mut Criterion) {
    let mut cache = loaded_cache();
    let mut step = 0.0;
    c.bench_function("moving_frame", |b| {
        b.iter(|| {
            step += 1.0;
            let view = perspective_view(DVec3::new(4000.0 + step, 4000.0, 150.0));
            black_box(cache.update(&view).requested)
        })
    });
}

criterion_group!(benches, bench_steady_frame, bench_moving_frame);
criterion_main!(benches);
