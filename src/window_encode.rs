use ndarray::Array2;
use rand::Rng;

use crate::affine::Affine;
use crate::embeddings::VectorTable;
use crate::error::{Result, TaggerError};
use crate::network::{Activation, Layer, LayerContext};
use crate::optimizer::{Optimizer, ParamKey};
use crate::window::{backprop_windows, extract_windows};

/// Embeds each token, concatenates the embeddings of its `n`-token context
/// window and projects the result to `nr_out`.
pub struct WindowEncode {
    table: VectorTable,
    n: usize,
    affine: Affine,
}

impl WindowEncode {
    pub fn new<R: Rng>(nr_in: usize, nr_out: usize, n: usize, rng: &mut R) -> Result<Self> {
        Ok(WindowEncode {
            table: VectorTable::new(nr_in, rng)?,
            n,
            affine: Affine::new(nr_in * (2 * n + 1), nr_out, rng)?,
        })
    }
}

impl Layer for WindowEncode {
    fn layer_type(&self) -> &str {
        "WindowEncode"
    }

    fn nr_in(&self) -> usize {
        self.table.width()
    }

    fn nr_out(&self) -> usize {
        self.affine.nr_out()
    }

    fn forward(&self, input: &Activation) -> Result<(Activation, LayerContext)> {
        let ids = input.ids(self.layer_type())?;
        let lengths = input.lengths().to_vec();
        let embedded = self.table.lookup(ids);
        let windowed = extract_windows(&embedded, &lengths, self.n)?;
        let output = self.affine.forward(&windowed);
        Ok((
            Activation::Dense { values: output, lengths: lengths.clone() },
            LayerContext::WindowEncode { ids: ids.clone(), lengths, windowed },
        ))
    }

    fn backward(&mut self, context: LayerContext, grads: &Array2<f32>) -> Result<Option<Array2<f32>>> {
        let LayerContext::WindowEncode { ids, lengths, windowed } = context else {
            return Err(TaggerError::ContextMismatch(self.layer_type().to_string()));
        };
        let d_windowed = self.affine.backward(&windowed, grads);
        let d_embedded = backprop_windows(&d_windowed, &lengths, self.n)?;
        self.table.accumulate(&ids, &d_embedded);
        Ok(None)
    }

    fn update(&mut self, key: &ParamKey, optimizer: &mut Optimizer) {
        self.affine.update(key, optimizer);
        self.table.update(key, optimizer);
    }

    fn zero_gradients(&mut self) {
        self.affine.zero_gradients();
        self.table.zero_gradients();
    }

    fn parameters(&self) -> usize {
        self.affine.parameters() + self.table.parameters()
    }

    fn vectors(&self) -> Option<&VectorTable> {
        Some(&self.table)
    }

    fn vectors_mut(&mut self) -> Option<&mut VectorTable> {
        Some(&mut self.table)
    }
}
