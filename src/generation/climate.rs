use crate::biome::{BiomeId, BiomeRegistry, ClimateSample};
use crate::constants::generation::TERRAIN_ALPHA;
use crate::noise::{NoiseDomain, NoiseField, NoiseParams};

/// Amplitude of terrain noise in blocks before the biome multiplier
const VARIATION_SCALE: f32 = 24.0;
/// Biome height parameters are blended across a lattice of this spacing
const BLEND_CELL: i32 = 4;
/// Spreads the climate channels, which otherwise cluster around 0.5
const CLIMATE_CONTRAST: f32 = 1.6;

/// Pure column-level sampling shared by every generation pass.
///
/// Everything here depends only on the seed and world column, never on
/// chunk contents, so neighbouring chunks agree on every value.
#[derive(Debug)]
pub struct ClimateSampler {
    noise: NoiseField,
    sea_level: i32,
    world_height: i32,
    temperature: NoiseParams,
    humidity: NoiseParams,
    continentalness: NoiseParams,
    erosion: NoiseParams,
    weirdness: NoiseParams,
    terrain: NoiseParams,
    ridge: NoiseParams,
}

/// Height of one column plus whether it had to be clamped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnHeight {
    pub height: i32,
    pub degenerate: bool,
}

impl ClimateSampler {
    pub fn new(seed: u64, world_height: usize, sea_level: i32) -> Self {
        Self {
            noise: NoiseField::new(seed),
            sea_level,
            world_height: world_height as i32,
            temperature: NoiseParams::new(0.0015, 3),
            humidity: NoiseParams::new(0.0015, 3),
            continentalness: NoiseParams::new(0.001, 4),
            erosion: NoiseParams::new(0.002, 3),
            weirdness: NoiseParams::new(0.003, 2),
            terrain: NoiseParams::new(0.008, 5),
            ridge: NoiseParams::new(0.004, 4).ridged(),
        }
    }

    pub fn noise(&self) -> &NoiseField {
        &self.noise
    }

    pub fn sea_level(&self) -> i32 {
        self.sea_level
    }

    pub fn world_height(&self) -> i32 {
        self.world_height
    }

    fn channel(&self, domain: NoiseDomain, wx: i32, wz: i32, params: &NoiseParams) -> f32 {
        let raw = self.noise.sample_2d(domain, wx as f64, wz as f64, params);
        ((raw * CLIMATE_CONTRAST).clamp(-1.0, 1.0) + 1.0) * 0.5
    }

    /// Climate channels at a column
    pub fn climate(&self, wx: i32, wz: i32) -> ClimateSample {
        ClimateSample {
            temperature: self.channel(NoiseDomain::Temperature, wx, wz, &self.temperature),
            humidity: self.channel(NoiseDomain::Humidity, wx, wz, &self.humidity),
            continentalness: self.channel(NoiseDomain::Continentalness, wx, wz, &self.continentalness),
            erosion: self.channel(NoiseDomain::Erosion, wx, wz, &self.erosion),
            weirdness: self.channel(NoiseDomain::Weirdness, wx, wz, &self.weirdness),
        }
    }

    pub fn biome(&self, wx: i32, wz: i32) -> BiomeId {
        BiomeRegistry::global().classify(&self.climate(wx, wz))
    }

    /// `(base_offset, height_variation)` of the biome at a lattice point
    pub(crate) fn lattice_params(&self, wx: i32, wz: i32) -> (f32, f32) {
        let props = BiomeRegistry::global().get(self.biome(wx, wz));
        (props.base_offset as f32, props.height_variation)
    }

    /// Lattice point at or below a world coordinate
    #[inline]
    pub(crate) fn lattice_floor(v: i32) -> i32 {
        v.div_euclid(BLEND_CELL) * BLEND_CELL
    }

    /// Bilinear blend of the four lattice corners around a column
    pub(crate) fn blend(wx: i32, wz: i32, corners: [(f32, f32); 4]) -> (f32, f32) {
        let fx = (wx - Self::lattice_floor(wx)) as f32 / BLEND_CELL as f32;
        let fz = (wz - Self::lattice_floor(wz)) as f32 / BLEND_CELL as f32;
        let [c00, c10, c01, c11] = corners;
        let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
        let base = lerp(lerp(c00.0, c10.0, fx), lerp(c01.0, c11.0, fx), fz);
        let variation = lerp(lerp(c00.1, c10.1, fx), lerp(c01.1, c11.1, fx), fz);
        (base, variation)
    }

    /// Blended height parameters of a single column
    pub fn height_params(&self, wx: i32, wz: i32) -> (f32, f32) {
        let x0 = Self::lattice_floor(wx);
        let z0 = Self::lattice_floor(wz);
        let corners = [
            self.lattice_params(x0, z0),
            self.lattice_params(x0 + BLEND_CELL, z0),
            self.lattice_params(x0, z0 + BLEND_CELL),
            self.lattice_params(x0 + BLEND_CELL, z0 + BLEND_CELL),
        ];
        Self::blend(wx, wz, corners)
    }

    /// Column height from already-blended biome parameters
    pub fn column_height_with(&self, wx: i32, wz: i32, base: f32, variation: f32) -> ColumnHeight {
        let terrain = self.noise.sample_2d(NoiseDomain::Terrain, wx as f64, wz as f64, &self.terrain);
        let ridge = self.noise.sample_2d(NoiseDomain::Ridge, wx as f64, wz as f64, &self.ridge);
        let shape = TERRAIN_ALPHA * terrain + (1.0 - TERRAIN_ALPHA) * ridge;
        let raw = (self.sea_level as f32 + base + VARIATION_SCALE * shape * variation).floor() as i32;

        if raw >= self.world_height - 1 {
            ColumnHeight {
                height: self.world_height - 2,
                degenerate: true,
            }
        } else {
            ColumnHeight {
                height: raw.max(1),
                degenerate: false,
            }
        }
    }

    /// Surface height of a column before caves and decoration
    pub fn column_height(&self, wx: i32, wz: i32) -> ColumnHeight {
        let (base, variation) = self.height_params(wx, wz);
        self.column_height_with(wx, wz, base, variation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heights_in_range() {
        let sampler = ClimateSampler::new(42, 128, 63);
        for i in -40..40 {
            let h = sampler.column_height(i * 37, i * -53);
            assert!(h.height >= 1 && h.height <= 126);
        }
    }

    #[test]
    fn test_small_world_clamps_degenerate_columns() {
        let sampler = ClimateSampler::new(7, 32, 30);
        let h = sampler.column_height_with(5, 9, 100.0, 0.0);
        assert!(h.degenerate);
        assert_eq!(h.height, 30);

        let h = sampler.column_height_with(5, 9, -100.0, 0.0);
        assert!(!h.degenerate);
        assert_eq!(h.height, 1);
    }

    #[test]
    fn test_blend_hits_corners_exactly() {
        let corners = [(1.0, 0.5), (3.0, 1.0), (5.0, 1.5), (7.0, 2.0)];
        assert_eq!(ClimateSampler::blend(8, 12, corners), (1.0, 0.5));
        let (base, _) = ClimateSampler::blend(10, 12, corners);
        assert!((base - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_climate_channels_normalised() {
        let sampler = ClimateSampler::new(3, 256, 63);
        for i in 0..50 {
            let c = sampler.climate(i * 101, i * -77);
            for v in [c.temperature, c.humidity, c.continentalness, c.erosion, c.weirdness] {
                assert!((0.0..=1.0).contains(&v));
            }
        }
    }
}
