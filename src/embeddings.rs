use std::collections::HashMap;

use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::batch::TokenId;
use crate::error::{Result, TaggerError};
use crate::network::{Activation, Layer, LayerContext};
use crate::optimizer::{Optimizer, ParamKey};

/// Growable table of trainable vectors keyed by token id.
///
/// Each registered id owns one row of `vectors` and the same row of
/// `gradients`. Rows are only appended, never removed.
pub struct VectorTable {
    width: usize,
    index: HashMap<TokenId, usize>,
    vectors: Array2<f32>,
    gradients: Array2<f32>,
    init: Normal<f32>,
    rng: StdRng,
}

impl VectorTable {
    pub fn new<R: Rng>(width: usize, rng: &mut R) -> Result<Self> {
        let init = Normal::new(0.0, 1.0 / (width.max(1) as f32).sqrt())?;
        Ok(VectorTable {
            width,
            index: HashMap::new(),
            vectors: Array2::zeros((0, width)),
            gradients: Array2::zeros((0, width)),
            init,
            rng: StdRng::from_rng(rng),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, id: TokenId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = TokenId> + '_ {
        self.index.keys().copied()
    }

    /// Adds a fresh random vector and a zero gradient row for `id`.
    /// Returns `false` and leaves the table untouched if `id` is already present.
    pub fn add_vector(&mut self, id: TokenId) -> Result<bool> {
        if self.index.contains_key(&id) {
            return Ok(false);
        }
        let vector: Array1<f32> = Array1::from_shape_fn(self.width, |_| self.init.sample(&mut self.rng));
        self.vectors.push_row(vector.view())?;
        self.gradients.push_row(Array1::zeros(self.width).view())?;
        self.index.insert(id, self.vectors.nrows() - 1);
        Ok(true)
    }

    pub fn get(&self, id: TokenId) -> Option<ArrayView1<'_, f32>> {
        self.index.get(&id).map(|&row| self.vectors.row(row))
    }

    pub fn gradient(&self, id: TokenId) -> Option<ArrayView1<'_, f32>> {
        self.index.get(&id).map(|&row| self.gradients.row(row))
    }

    /// One row per id. Unregistered ids read as zeros.
    pub fn lookup(&self, ids: &Array1<TokenId>) -> Array2<f32> {
        let mut output = Array2::zeros((ids.len(), self.width));
        for (mut out_row, id) in output.rows_mut().into_iter().zip(ids.iter()) {
            if let Some(&row) = self.index.get(id) {
                out_row.assign(&self.vectors.row(row));
            }
        }
        output
    }

    /// Adds `grads` row by row into the gradients of `ids`. Unregistered ids are skipped.
    pub fn accumulate(&mut self, ids: &Array1<TokenId>, grads: &Array2<f32>) {
        for (id, grad_row) in ids.iter().zip(grads.rows()) {
            if let Some(&row) = self.index.get(id) {
                let mut target = self.gradients.row_mut(row);
                target += &grad_row;
            }
        }
    }

    pub fn update(&mut self, key: &ParamKey, optimizer: &mut Optimizer) {
        if self.index.is_empty() {
            return;
        }
        optimizer.step(key.child("vectors"), &mut self.vectors, &mut self.gradients);
    }

    pub fn zero_gradients(&mut self) {
        self.gradients.fill(0.0);
    }

    pub fn parameters(&self) -> usize {
        self.vectors.len()
    }
}

/// Plain embedding lookup: token ids to `width`-wide rows.
pub struct Embed {
    table: VectorTable,
}

impl Embed {
    pub fn new<R: Rng>(width: usize, rng: &mut R) -> Result<Self> {
        Ok(Embed {
            table: VectorTable::new(width, rng)?,
        })
    }
}

impl Layer for Embed {
    fn layer_type(&self) -> &str {
        "Embed"
    }

    fn nr_in(&self) -> usize {
        self.table.width()
    }

    fn nr_out(&self) -> usize {
        self.table.width()
    }

    fn forward(&self, input: &Activation) -> Result<(Activation, LayerContext)> {
        let ids = input.ids(self.layer_type())?;
        let values = self.table.lookup(ids);
        let output = Activation::Dense {
            values,
            lengths: input.lengths().to_vec(),
        };
        Ok((output, LayerContext::Embed { ids: ids.clone() }))
    }

    fn backward(&mut self, context: LayerContext, grads: &Array2<f32>) -> Result<Option<Array2<f32>>> {
        let LayerContext::Embed { ids } = context else {
            return Err(TaggerError::ContextMismatch(self.layer_type().to_string()));
        };
        self.table.accumulate(&ids, grads);
        Ok(None)
    }

    fn update(&mut self, key: &ParamKey, optimizer: &mut Optimizer) {
        self.table.update(key, optimizer);
    }

    fn zero_gradients(&mut self) {
        self.table.zero_gradients();
    }

    fn parameters(&self) -> usize {
        self.table.parameters()
    }

    fn vectors(&self) -> Option<&VectorTable> {
        Some(&self.table)
    }

    fn vectors_mut(&mut self) -> Option<&mut VectorTable> {
        Some(&mut self.table)
    }
}
