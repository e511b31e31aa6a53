use ndarray::Array2;
use rand::Rng;

use crate::affine::Affine;
use crate::error::{Result, TaggerError};
use crate::network::{Activation, Layer, LayerContext};
use crate::optimizer::{Optimizer, ParamKey};

/// Output classifier: row-wise softmax over `xW + b`.
///
/// `backward` expects the gradient of the loss with respect to the logits,
/// i.e. `probs - truth` for cross-entropy, not with respect to the probabilities.
pub struct Softmax {
    affine: Affine,
}

impl Softmax {
    /// Initialize output layer with random weights and zero bias
    pub fn new<R: Rng + ?Sized>(nr_in: usize, nr_class: usize, rng: &mut R) -> Result<Self> {
        Ok(Softmax {
            affine: Affine::new(nr_in, nr_class, rng)?,
        })
    }

    pub fn affine(&self) -> &Affine {
        &self.affine
    }
}

/// Numerically stable softmax of every row.
pub fn softmax(scores: &Array2<f32>) -> Array2<f32> {
    let mut result = scores.clone();
    for mut row in result.rows_mut() {
        let max_val = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        row.mapv_inplace(|x| (x - max_val).exp());
        let sum_exp = row.sum();
        row /= sum_exp;
    }
    result
}

impl Layer for Softmax {
    fn layer_type(&self) -> &str {
        "Softmax"
    }

    fn nr_in(&self) -> usize {
        self.affine.nr_in()
    }

    fn nr_out(&self) -> usize {
        self.affine.nr_out()
    }

    fn forward(&self, input: &Activation) -> Result<(Activation, LayerContext)> {
        let x = input.dense(self.layer_type())?;
        let probs = softmax(&self.affine.forward(x));
        Ok((
            Activation::Dense { values: probs, lengths: input.lengths().to_vec() },
            LayerContext::Softmax { input: x.clone() },
        ))
    }

    fn backward(&mut self, context: LayerContext, grads: &Array2<f32>) -> Result<Option<Array2<f32>>> {
        let LayerContext::Softmax { input } = context else {
            return Err(TaggerError::ContextMismatch(self.layer_type().to_string()));
        };
        Ok(Some(self.affine.backward(&input, grads)))
    }

    fn update(&mut self, key: &ParamKey, optimizer: &mut Optimizer) {
        self.affine.update(key, optimizer);
    }

    fn zero_gradients(&mut self) {
        self.affine.zero_gradients();
    }

    fn parameters(&self) -> usize {
        self.affine.parameters()
    }
}
