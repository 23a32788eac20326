//! Seeded noise fields
//!
//! Each `NoiseDomain` owns an independent gradient lattice derived from the
//! master seed and the domain tag, so terrain, climate and cave noise never
//! correlate. Sampling is a pure function of `(seed, domain, position,
//! params)` and is safe to call from any thread.

use ::noise::{NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

/// Independent noise channels used by world generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoiseDomain {
    Terrain,
    Ridge,
    Temperature,
    Humidity,
    Continentalness,
    Erosion,
    Weirdness,
    Cave,
    Ore,
    Structure,
}

impl NoiseDomain {
    pub const ALL: [NoiseDomain; 10] = [
        NoiseDomain::Terrain,
        NoiseDomain::Ridge,
        NoiseDomain::Temperature,
        NoiseDomain::Humidity,
        NoiseDomain::Continentalness,
        NoiseDomain::Erosion,
        NoiseDomain::Weirdness,
        NoiseDomain::Cave,
        NoiseDomain::Ore,
        NoiseDomain::Structure,
    ];

    /// Stable tag mixed into the master seed
    pub fn tag(self) -> u64 {
        match self {
            NoiseDomain::Terrain => 0x7465_7272,
            NoiseDomain::Ridge => 0x7269_6467,
            NoiseDomain::Temperature => 0x7465_6d70,
            NoiseDomain::Humidity => 0x6875_6d69,
            NoiseDomain::Continentalness => 0x636f_6e74,
            NoiseDomain::Erosion => 0x6572_6f73,
            NoiseDomain::Weirdness => 0x7765_6972,
            NoiseDomain::Cave => 0x6361_7665,
            NoiseDomain::Ore => 0x6f72_6573,
            NoiseDomain::Structure => 0x7374_7275,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Fractal sampling parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseParams {
    pub frequency: f64,
    pub octaves: u32,
    pub lacunarity: f64,
    pub persistence: f64,
    /// Fold each octave into ridges (`1 - |n|`)
    pub ridged: bool,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            frequency: 0.01,
            octaves: 4,
            lacunarity: 2.0,
            persistence: 0.5,
            ridged: false,
        }
    }
}

impl NoiseParams {
    pub fn new(frequency: f64, octaves: u32) -> Self {
        Self {
            frequency,
            octaves,
            ..Self::default()
        }
    }

    pub fn ridged(mut self) -> Self {
        self.ridged = true;
        self
    }
}

/// Splitmix64 finaliser folded over a list of keys.
///
/// Used for every per-chunk, per-ore and per-structure RNG seed so that
/// results depend only on the master seed and the keys.
pub fn mix_seed(seed: u64, keys: &[i64]) -> u64 {
    let mut state = seed;
    for &key in keys {
        state ^= key as u64;
        state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        state = z ^ (z >> 31);
    }
    state
}

/// Seeded multi-domain noise source
pub struct NoiseField {
    seed: u64,
    lattices: Vec<Perlin>,
}

impl NoiseField {
    pub fn new(seed: u64) -> Self {
        let lattices = NoiseDomain::ALL
            .iter()
            .map(|domain| Perlin::new(Self::domain_seed(seed, *domain)))
            .collect();
        Self { seed, lattices }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// 32-bit lattice seed for a domain
    pub fn domain_seed(seed: u64, domain: NoiseDomain) -> u32 {
        let mixed = mix_seed(seed, &[domain.tag() as i64]);
        (mixed ^ (mixed >> 32)) as u32
    }

    /// Sample a 3D fractal value in roughly [-1, 1]
    pub fn sample(&self, domain: NoiseDomain, x: f64, y: f64, z: f64, params: &NoiseParams) -> f32 {
        let lattice = &self.lattices[domain.index()];
        let mut frequency = params.frequency;
        let mut amplitude = 1.0;
        let mut total = 0.0;
        let mut norm = 0.0;

        for _ in 0..params.octaves.max(1) {
            let raw = lattice.get([x * frequency, y * frequency, z * frequency]);
            let value = if params.ridged {
                let ridge = 1.0 - raw.abs();
                ridge * ridge * 2.0 - 1.0
            } else {
                raw
            };
            total += value * amplitude;
            norm += amplitude;
            amplitude *= params.persistence;
            frequency *= params.lacunarity;
        }

        ((total / norm) as f32).clamp(-1.0, 1.0)
    }

    /// Sample a 2D fractal value in roughly [-1, 1]
    pub fn sample_2d(&self, domain: NoiseDomain, x: f64, z: f64, params: &NoiseParams) -> f32 {
        self.sample(domain, x, 0.0, z, params)
    }

    /// 2D sample remapped to [0, 1]
    pub fn sample_unit_2d(&self, domain: NoiseDomain, x: f64, z: f64, params: &NoiseParams) -> f32 {
        (self.sample_2d(domain, x, z, params) + 1.0) * 0.5
    }
}

impl std::fmt::Debug for NoiseField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseField").field("seed", &self.seed).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampling_is_deterministic() {
        let a = NoiseField::new(1234);
        let b = NoiseField::new(1234);
        let params = NoiseParams::new(0.02, 4);
        for i in 0..32 {
            let x = i as f64 * 3.7;
            assert_eq!(
                a.sample(NoiseDomain::Terrain, x, 12.0, -x, &params),
                b.sample(NoiseDomain::Terrain, x, 12.0, -x, &params)
            );
        }
    }

    #[test]
    fn test_domains_are_independent() {
        let field = NoiseField::new(99);
        let params = NoiseParams::new(0.05, 2);
        let differs = (0..64).any(|i| {
            let x = i as f64 * 1.3 + 0.5;
            field.sample_2d(NoiseDomain::Temperature, x, x * 0.7, &params)
                != field.sample_2d(NoiseDomain::Humidity, x, x * 0.7, &params)
        });
        assert!(differs);
    }

    #[test]
    fn test_values_in_range() {
        let field = NoiseField::new(7);
        let params = NoiseParams::new(0.03, 5).ridged();
        for i in 0..200 {
            let v = field.sample(NoiseDomain::Ridge, i as f64 * 0.9, 3.0, i as f64 * -1.1, &params);
            assert!((-1.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_mix_seed_depends_on_keys() {
        assert_ne!(mix_seed(1, &[0, 1]), mix_seed(1, &[1, 0]));
        assert_eq!(mix_seed(5, &[3, -2]), mix_seed(5, &[3, -2]));
    }
}
