use ndarray::Array2;
use rand::Rng;

use crate::affine::Affine;
use crate::error::{Result, TaggerError};
use crate::network::{Activation, Layer, LayerContext};
use crate::optimizer::{Optimizer, ParamKey};

/// Hidden layer: `max(0, xW + b)`.
pub struct ReLu {
    affine: Affine,
}

impl ReLu {
    /// Initialize a hidden layer with random weights
    pub fn new<R: Rng + ?Sized>(nr_in: usize, nr_out: usize, rng: &mut R) -> Result<Self> {
        Ok(ReLu {
            affine: Affine::new(nr_in, nr_out, rng)?,
        })
    }

    pub fn affine(&self) -> &Affine {
        &self.affine
    }
}

impl Layer for ReLu {
    fn layer_type(&self) -> &str {
        "ReLu"
    }

    fn nr_in(&self) -> usize {
        self.affine.nr_in()
    }

    fn nr_out(&self) -> usize {
        self.affine.nr_out()
    }

    fn forward(&self, input: &Activation) -> Result<(Activation, LayerContext)> {
        let x = input.dense(self.layer_type())?;
        let output = self.affine.forward(x).mapv(|v| v.max(0.0));
        Ok((
            Activation::Dense { values: output.clone(), lengths: input.lengths().to_vec() },
            LayerContext::ReLu { input: x.clone(), output },
        ))
    }

    fn backward(&mut self, context: LayerContext, grads: &Array2<f32>) -> Result<Option<Array2<f32>>> {
        let LayerContext::ReLu { input, output } = context else {
            return Err(TaggerError::ContextMismatch(self.layer_type().to_string()));
        };
        // Gradient through ReLU
        let relu_grad = output.mapv(|x| if x > 0.0 { 1.0 } else { 0.0 });
        let grad_pre_activation = grads * &relu_grad;
        Ok(Some(self.affine.backward(&input, &grad_pre_activation)))
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
