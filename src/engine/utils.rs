use std::time::{SystemTime, UNIX_EPOCH};

use crate::constants::{WORLD_MARGIN, WORLD_SIZE};
use crate::rng::Rng;

pub fn now_ms() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    now as u64
}

pub(super) fn distance(ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
}

/// Reflects a coordinate off the playable band: velocity flips and the
/// position is pinned to the boundary it crossed.
pub(super) fn clamp_axis(pos: f32, vel: f32) -> (f32, f32) {
    let min = WORLD_MARGIN;
    let max = WORLD_SIZE - WORLD_MARGIN;
    if pos < min {
        (min, -vel)
    } else if pos > max {
        (max, -vel)
    } else {
        (pos, vel)
    }
}

pub(super) fn random_world_point(rng: &mut Rng) -> (f32, f32) {
    (
        rng.range(WORLD_MARGIN, WORLD_SIZE - WORLD_MARGIN),
        rng.range(WORLD_MARGIN, WORLD_SIZE - WORLD_MARGIN),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_axis_reflects_on_both_edges() {
        assert_eq!(clamp_axis(5.0, -2.0), (WORLD_MARGIN, 2.0));
        assert_eq!(
            clamp_axis(WORLD_SIZE + 3.0, 1.5),
            (WORLD_SIZE - WORLD_MARGIN, -1.5)
        );
        assert_eq!(clamp_axis(400.0, 1.0), (400.0, 1.0));
    }

    #[test]
    fn random_world_point_stays_inside_margin() {
        let mut rng = Rng::new(5);
        for _ in 0..1_000 {
            let (x, y) = random_world_point(&mut rng);
            assert!((WORLD_MARGIN..WORLD_SIZE - WORLD_MARGIN).contains(&x));
            assert!((WORLD_MARGIN..WORLD_SIZE - WORLD_MARGIN).contains(&y));
        }
    }
}
