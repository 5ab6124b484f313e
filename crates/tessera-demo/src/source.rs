//! Procedural tile sources with simulated latency and failures.

use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use tessera_cache::{
    FetchError, ImageTile, OctAddress, ProviderError, ProviderMetadata, QuadAddress, SurfaceTile,
    TileAddress, TileSource,
};
use tessera_config::ProviderConfig;

/// Surface samples per cell edge in generated meshes.
const SURFACE_GRID: u32 = 8;

/// Latency and failure behaviour shared by both sources.
#[derive(Clone, Debug)]
pub struct Simulation {
    seed: u64,
    latency: Duration,
    jitter_ms: u64,
    failure_rate: f64,
    metadata: ProviderMetadata,
}

impl Simulation {
    pub fn new(config: &ProviderConfig, seed: u64) -> Self {
        Self {
            seed,
            latency: Duration::from_millis(config.latency_ms),
            jitter_ms: config.latency_jitter_ms,
            failure_rate: config.failure_rate.clamp(0.0, 1.0),
            metadata: ProviderMetadata {
                format_version: config.format_version,
                min_level: config.min_level,
                max_level: config.max_level,
            },
        }
    }

    /// Per-address generator, so a tile is the same however often it is fetched.
    fn rng<const D: usize>(&self, address: &TileAddress<D>) -> Xoshiro256StarStar {
        let mut key = self.seed ^ (u64::from(address.level) << 56);
        for &c in &address.coords {
            key = (key ^ u64::from(c)).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        }
        Xoshiro256StarStar::seed_from_u64(key)
    }

    /// Sleep for the simulated latency, then decide whether the fetch fails.
    fn fetch<const D: usize>(&self, address: &TileAddress<D>) -> Result<Xoshiro256StarStar, FetchError> {
        let mut rng = self.rng(address);
        let jitter = if self.jitter_ms > 0 {
            rng.gen_range(0..=self.jitter_ms)
        } else {
            0
        };
        std::thread::sleep(self.latency + Duration::from_millis(jitter));
        if rng.gen_bool(self.failure_rate) {
            return Err(FetchError::Transport(format!("simulated outage at {address}")));
        }
        Ok(rng)
    }
}

/// Image tiles shaded by level with a checker that reveals tile seams.
pub struct ProceduralImages {
    simulation: Simulation,
    tile_pixels: u32,
}

impl ProceduralImages {
    pub fn new(simulation: Simulation, tile_pixels: u32) -> Self {
        Self {
            simulation,
            tile_pixels: tile_pixels.max(1),
        }
    }
}

impl TileSource<2> for ProceduralImages {
    type Payload = ImageTile;

    fn metadata(&self) -> Result<ProviderMetadata, ProviderError> {
        Ok(self.simulation.metadata)
    }

    fn fetch(&self, address: QuadAddress) -> Result<ImageTile, FetchError> {
        let mut rng = self.simulation.fetch(&address)?;
        let n = self.tile_pixels;
        let base: u8 = rng.gen_range(96..=160);
        let shade = (address.level as u32 * 16).min(255) as u8;
        let mut pixels = Vec::with_capacity(n as usize * n as usize);
        for y in 0..n {
            for x in 0..n {
                let checker = ((x * 8 / n) + (y * 8 / n)) % 2 == 0;
                let value = if checker { base } else { base / 2 };
                pixels.push([value, shade, (x * 255 / n) as u8, 255]);
            }
        }
        transmit_image(&ImageTile {
            width: n,
            height: n,
            pixels,
        })
    }
}

/// Pass an image through its wire format, as a remote source would deliver it.
fn transmit_image(tile: &ImageTile) -> Result<ImageTile, FetchError> {
    Ok(ImageTile::decode(&tile.encode()?)?)
}

/// Pass a surface through its wire format.
fn transmit_surface(tile: &SurfaceTile) -> Result<SurfaceTile, FetchError> {
    Ok(SurfaceTile::decode(&tile.encode())?)
}

/// Height of the rolling terrain at normalized horizontal position `(u, v)`, in `[0, 1]`.
pub fn terrain_height(u: f64, v: f64) -> f64 {
    let waves = (u * std::f64::consts::TAU * 3.0).sin() * (v * std::f64::consts::TAU * 2.0).cos();
    0.35 + 0.1 * waves
}

/// Surface tiles cut from a heightfield running through the volume.
pub struct ProceduralSurfaces {
    simulation: Simulation,
}

impl ProceduralSurfaces {
    pub fn new(simulation: Simulation) -> Self {
        Self { simulation }
    }
}

impl TileSource<3> for ProceduralSurfaces {
    type Payload = SurfaceTile;

    fn metadata(&self) -> Result<ProviderMetadata, ProviderError> {
        Ok(self.simulation.metadata)
    }

    fn fetch(&self, address: OctAddress) -> Result<SurfaceTile, FetchError> {
        self.simulation.fetch(&address)?;
        transmit_surface(&surface_patch(&address))
    }
}

/// The part of the terrain surface inside `address`, in cell-local coordinates.
///
/// Cells the surface does not cross get an empty tile.
pub fn surface_patch(address: &OctAddress) -> SurfaceTile {
    let cell = 1.0 / f64::from(1u32 << address.level);
    let [cx, cy, cz] = address.coords.map(f64::from);

    let mut positions = Vec::with_capacity(((SURFACE_GRID + 1) * (SURFACE_GRID + 1)) as usize);
    let (mut below, mut above) = (false, false);
    for j in 0..=SURFACE_GRID {
        for i in 0..=SURFACE_GRID {
            let lu = f64::from(i) / f64::from(SURFACE_GRID);
            let lv = f64::from(j) / f64::from(SURFACE_GRID);
            let h = terrain_height((cx + lu) * cell, (cy + lv) * cell);
            let lz = (h - cz * cell) / cell;
            below |= lz <= 1.0;
            above |= lz >= 0.0;
            positions.push([lu as f32, lv as f32, lz.clamp(0.0, 1.0) as f32]);
        }
    }
    let crosses = positions.iter().any(|p| p[2] > 0.0 && p[2] < 1.0);
    if !(below && above && crosses) {
        return SurfaceTile::new(Vec::new(), Vec::new());
    }

    let row = SURFACE_GRID + 1;
    let mut indices = Vec::with_capacity((SURFACE_GRID * SURFACE_GRID * 6) as usize);
    for j in 0..SURFACE_GRID {
        for i in 0..SURFACE_GRID {
            let a = j * row + i;
            let b = a + 1;
            let c = a + row;
            let d = c + 1;
            indices.extend_from_slice(&[a, b, d, a, d, c]);
        }
    }
    SurfaceTile::new(positions, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_cache::PayloadError;

    fn simulation(failure_rate: f64) -> Simulation {
        let config = ProviderConfig {
            latency_ms: 0,
            latency_jitter_ms: 0,
            failure_rate,
            ..ProviderConfig::default()
        };
        Simulation::new(&config, 11)
    }

    #[test]
    fn test_images_are_deterministic_per_address() {
        let source = ProceduralImages::new(simulation(0.0), 16);
        let address = QuadAddress::new(3, [5, 2]);
        let first = source.fetch(address).unwrap();
        assert_eq!(first.pixels.len(), 256);
        assert_eq!(first, source.fetch(address).unwrap());
    }

    #[test]
    fn test_failure_rate_one_always_fails() {
        let source = ProceduralImages::new(simulation(1.0), 4);
        assert!(matches!(
            source.fetch(QuadAddress::root()),
            Err(FetchError::Transport(_))
        ));
    }

    /// The root cell always contains the whole surface.
    #[test]
    fn test_root_patch_is_full_grid() {
        let patch = surface_patch(&OctAddress::root());
        assert_eq!(patch.positions.len(), 81);
        assert_eq!(patch.triangle_count(), 128);
    }

    /// At level 1 the surface (heights 0.25..0.45) lies in the lower half only.
    #[test]
    fn test_patch_empty_above_surface() {
        assert!(surface_patch(&OctAddress::new(1, [0, 0, 1])).indices.is_empty());
        assert!(!surface_patch(&OctAddress::new(1, [0, 0, 0])).indices.is_empty());
    }

    #[test]
    fn test_surfaces_survive_wire_format() {
        let source = ProceduralSurfaces::new(simulation(0.0));
        let address = OctAddress::new(1, [1, 0, 0]);
        assert_eq!(source.fetch(address).unwrap(), surface_patch(&address));
    }

    /// An image the wire format cannot carry surfaces as a decode failure.
    #[test]
    fn test_untransmittable_image_is_decode_error() {
        let tile = ImageTile {
            width: 1 << 17,
            height: 1,
            pixels: Vec::new(),
        };
        assert!(matches!(
            transmit_image(&tile),
            Err(FetchError::Decode(PayloadError::TooLarge { .. }))
        ));
    }

    #[test]
    fn test_metadata_reports_configured_range() {
        let source = ProceduralSurfaces::new(simulation(0.0));
        let metadata = source.metadata().unwrap();
        assert_eq!((metadata.min_level, metadata.max_level), (0, 12));
    }
}
