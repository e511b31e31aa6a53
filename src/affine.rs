use ndarray::{Array2, Axis};
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::Result;
use crate::optimizer::{Optimizer, ParamKey};

/// `xW + b` with gradient buffers shaped like `W` and `b`.
pub struct Affine {
    pub w: Array2<f32>,
    pub b: Array2<f32>,
    d_w: Array2<f32>,
    d_b: Array2<f32>,
}

impl Affine {
    pub fn new<R: Rng + ?Sized>(nr_in: usize, nr_out: usize, rng: &mut R) -> Result<Self> {
        // He initialization: std = sqrt(2 / fan_in)
        let std = (2.0 / nr_in.max(1) as f32).sqrt();
        let normal = Normal::new(0.0, std)?;
        Ok(Affine {
            w: Array2::from_shape_fn((nr_in, nr_out), |_| normal.sample(rng)),
            b: Array2::zeros((1, nr_out)),
            d_w: Array2::zeros((nr_in, nr_out)),
            d_b: Array2::zeros((1, nr_out)),
        })
    }

    pub fn nr_in(&self) -> usize {
        self.w.nrows()
    }

    pub fn nr_out(&self) -> usize {
        self.w.ncols()
    }

    pub fn forward(&self, input: &Array2<f32>) -> Array2<f32> {
        input.dot(&self.w) + &self.b
    }

    /// Accumulates weight gradients and returns the gradient w.r.t. `input`.
    pub fn backward(&mut self, input: &Array2<f32>, grads: &Array2<f32>) -> Array2<f32> {
        self.d_w += &input.t().dot(grads);
        self.d_b += &grads.sum_axis(Axis(0)).insert_axis(Axis(0));
        grads.dot(&self.w.t())
    }

    pub fn gradients(&self) -> (&Array2<f32>, &Array2<f32>) {
        (&self.d_w, &self.d_b)
    }

    pub fn update(&mut self, key: &ParamKey, optimizer: &mut Optimizer) {
        optimizer.step(key.child("W"), &mut self.w, &mut self.d_w);
        optimizer.step(key.child("b"), &mut self.b, &mut self.d_b);
    }

    pub fn zero_gradients(&mut self) {
        self.d_w.fill(0.0);
        self.d_b.fill(0.0);
    }

    pub fn parameters(&self) -> usize {
        self.w.len() + self.b.len()
    }
}
