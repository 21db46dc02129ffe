use anyhow::{Result, bail};
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use std::{fmt::Debug, ops::RangeBounds};

pub fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

/// Round a value to 3 decimal places.
pub fn round3(val: f64) -> f64 {
    (val * 1000.0).round() / 1000.0
}

/// Draw a uniform value in `[low, high]`, or `low` if the range is empty.
pub fn draw_between<R: Rng + ?Sized>(rng: &mut R, low: f64, high: f64) -> f64 {
    match Uniform::new_inclusive(low, high) {
        Ok(dist) if low < high => dist.sample(rng),
        _ => low,
    }
}

/// Draw a uniform value in `[low, high]` rounded to 3 decimal places.
pub fn draw_rounded<R: Rng + ?Sized>(rng: &mut R, low: f64, high: f64) -> f64 {
    round3(draw_between(rng, low, high))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    #[test]
    fn check_num_rejects_values_outside_range() {
        assert!(check_num(0.5, 0.0..=1.0).is_ok());
        assert!(check_num(1.5, 0.0..=1.0).is_err());
        assert!(check_num(f64::NAN, 0.0..=1.0).is_err());
        assert!(check_num(0usize, 1..).is_err());
    }

    #[test]
    fn round3_keeps_three_decimals() {
        assert_eq!(round3(0.12345), 0.123);
        assert_eq!(round3(0.9996), 1.0);
    }

    #[test]
    fn rounded_draws_stay_in_bounds() {
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        for _ in 0..1000 {
            let val = draw_rounded(&mut rng, 0.5, 1.0);
            assert!((0.5..=1.0).contains(&val));
        }
        assert_eq!(draw_between(&mut rng, 0.0, 0.0), 0.0);
    }
}
