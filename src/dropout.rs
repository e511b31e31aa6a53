use ndarray::Array2;
use rand::Rng;
use rand_distr::{Bernoulli, Distribution};

use crate::error::{Result, TaggerError};

/// Inverted dropout mask: each entry is `0` with probability `drop`, otherwise
/// `1 / (1 - drop)`, so the expected activation is unchanged. `None` when
/// `drop` is zero.
pub fn mask<R: Rng + ?Sized>(shape: (usize, usize), drop: f32, rng: &mut R) -> Result<Option<Array2<f32>>> {
    if !(0.0..1.0).contains(&drop) {
        return Err(TaggerError::InvalidDropout(drop));
    }
    if drop == 0.0 {
        return Ok(None);
    }
    let keep = Bernoulli::new(1.0 - drop as f64)?;
    let scale = 1.0 / (1.0 - drop);
    Ok(Some(Array2::from_shape_fn(shape, |_| {
        if keep.sample(rng) { scale } else { 0.0 }
    })))
}
