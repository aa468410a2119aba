/// Seeded generator shared by every simulation system so a seed fully
/// determines a run.
#[derive(Clone, Debug)]
pub struct Rng {
    state: u32,
}

impl Rng {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Uniform in `[0, 1)`.
    pub fn unit(&mut self) -> f32 {
        self.state = self.state.wrapping_add(0x6d2b79f5);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        let out = t ^ (t >> 14);
        ((out as f64 / 4_294_967_296.0) as f32).min(0.999_999_9)
    }

    /// Uniform in `[min, max)`.
    pub fn range(&mut self, min: f32, max: f32) -> f32 {
        if max <= min {
            return min;
        }
        min + self.unit() * (max - min)
    }

    /// Uniform integer in `[min, max]`.
    pub fn int(&mut self, min: i32, max: i32) -> i32 {
        if max <= min {
            return min;
        }
        let span = (max - min + 1) as f32;
        (min + (self.unit() * span).floor() as i32).min(max)
    }

    /// Uniform in `[min, max)`.
    pub fn millis(&mut self, min: u64, max: u64) -> u64 {
        if max <= min {
            return min;
        }
        let span = max - min;
        (min + (self.unit() as f64 * span as f64).floor() as u64).min(max - 1)
    }

    pub fn chance(&mut self, probability: f32) -> bool {
        self.unit() < probability
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_stays_in_half_open_range() {
        let mut rng = Rng::new(7);
        for _ in 0..10_000 {
            let value = rng.millis(10_000, 15_000);
            assert!((10_000..15_000).contains(&value));
        }
    }

    #[test]
    fn int_is_inclusive_on_both_ends() {
        let mut rng = Rng::new(99);
        let mut seen_min = false;
        let mut seen_max = false;
        for _ in 0..5_000 {
            let value = rng.int(5, 15);
            assert!((5..=15).contains(&value));
            seen_min |= value == 5;
            seen_max |= value == 15;
        }
        assert!(seen_min && seen_max);
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = Rng::new(1234);
        let mut b = Rng::new(1234);
        for _ in 0..64 {
            assert_eq!(a.unit().to_bits(), b.unit().to_bits());
        }
    }
}
