//! Seeded 2-D gradient noise.
//!
//! Classic permutation-table Perlin noise: a 256-entry table shuffled from
//! the seed and doubled to 512 entries so corner hashing never wraps
//! through a modulo. Identical seed and coordinates always produce
//! identical output, across runs and thread counts.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub struct NoiseGenerator {
    perm: [i32; 512],
}

impl NoiseGenerator {
    pub fn new(seed: u32) -> Self {
        let mut table: Vec<i32> = (0..256).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed as u64);
        table.shuffle(&mut rng);

        let mut perm = [0i32; 512];
        for i in 0..256 {
            perm[i] = table[i];
            perm[i + 256] = table[i];
        }
        Self { perm }
    }

    /// Quintic fade curve: 6t^5 - 15t^4 + 10t^3.
    #[inline]
    fn fade(t: f32) -> f32 {
        t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
    }

    #[inline]
    fn lerp(t: f32, a: f32, b: f32) -> f32 {
        a + t * (b - a)
    }

    /// Map the low 4 bits of a hash onto one of 12 gradient directions.
    #[inline]
    fn grad(hash: i32, x: f32, y: f32) -> f32 {
        let h = hash & 15;
        let u = if h < 8 { x } else { y };
        let v = if h < 4 {
            y
        } else if h == 12 || h == 14 {
            x
        } else {
            0.0
        };
        (if h & 1 == 0 { u } else { -u }) + (if h & 2 == 0 { v } else { -v })
    }

    /// Raw gradient noise at (x, y), roughly in [-1, 1].
    pub fn noise(&self, x: f32, y: f32) -> f32 {
        // Unit cell containing the point.
        let cell_x = (x.floor() as i32 & 255) as usize;
        let cell_y = (y.floor() as i32 & 255) as usize;

        // Fractional offsets within the cell.
        let x = x - x.floor();
        let y = y - y.floor();

        let u = Self::fade(x);
        let v = Self::fade(y);

        // Hash the four cell corners.
        let a = (self.perm[cell_x] + cell_y as i32) as usize;
        let aa = self.perm[a] as usize;
        let ab = self.perm[a + 1] as usize;
        let b = (self.perm[cell_x + 1] + cell_y as i32) as usize;
        let ba = self.perm[b] as usize;
        let bb = self.perm[b + 1] as usize;

        Self::lerp(
            v,
            Self::lerp(
                u,
                Self::grad(self.perm[aa], x, y),
                Self::grad(self.perm[ba], x - 1.0, y),
            ),
            Self::lerp(
                u,
                Self::grad(self.perm[ab], x, y - 1.0),
                Self::grad(self.perm[bb], x - 1.0, y - 1.0),
            ),
        )
    }

    /// Fractional Brownian motion: sum `octaves` noise layers at rising
    /// frequency (lacunarity per octave) and falling amplitude (persistence
    /// per octave), normalized by the total amplitude.
    pub fn octave_noise(
        &self,
        x: f32,
        y: f32,
        octaves: u32,
        persistence: f32,
        lacunarity: f32,
    ) -> f32 {
        let mut total = 0.0;
        let mut frequency = 1.0;
        let mut amplitude = 1.0;
        let mut max_value = 0.0;

        for _ in 0..octaves {
            total += self.noise(x * frequency, y * frequency) * amplitude;
            max_value += amplitude;
            amplitude *= persistence;
            frequency *= lacunarity;
        }

        total / max_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_output() {
        let a = NoiseGenerator::new(42);
        let b = NoiseGenerator::new(42);
        for i in 0..100 {
            let x = i as f32 * 0.173;
            let y = i as f32 * 0.311;
            assert_eq!(a.noise(x, y), b.noise(x, y));
            assert_eq!(
                a.octave_noise(x, y, 6, 0.5, 2.0),
                b.octave_noise(x, y, 6, 0.5, 2.0)
            );
        }
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = NoiseGenerator::new(42);
        let b = NoiseGenerator::new(43);
        let differs = (0..100).any(|i| {
            let x = i as f32 * 0.173;
            let y = i as f32 * 0.311;
            a.noise(x, y) != b.noise(x, y)
        });
        assert!(differs);
    }

    #[test]
    fn test_octave_noise_stays_bounded() {
        let gen = NoiseGenerator::new(7);
        for (persistence, lacunarity) in [(0.5, 2.0), (0.6, 2.5), (0.3, 3.0)] {
            for i in 0..500 {
                let x = i as f32 * 0.137;
                let y = i as f32 * 0.291;
                let v = gen.octave_noise(x, y, 6, persistence, lacunarity);
                assert!(
                    (-1.05..=1.05).contains(&v),
                    "octave noise out of range: {}",
                    v
                );
            }
        }
    }

    #[test]
    fn test_noise_varies_within_cell() {
        let gen = NoiseGenerator::new(1);
        let a = gen.noise(0.2, 0.3);
        let b = gen.noise(0.7, 0.8);
        assert_ne!(a, b);
    }
}
