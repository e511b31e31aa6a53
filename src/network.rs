use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::batch::{Example, Ops, TagId, TokenId};
use crate::chain::Chain;
use crate::config::{TaggerConfig, TrainConfig};
use crate::dropout;
use crate::embeddings::{Embed, VectorTable};
use crate::error::{Result, TaggerError};
use crate::feed_forward::ReLu;
use crate::optimizer::{Optimizer, ParamKey};
use crate::softmax::Softmax;
use crate::trainer::Trainer;
use crate::window::ExtractWindow;
use crate::window_encode::WindowEncode;

/// Values flowing between layers. Every variant keeps the per-sentence lengths so
/// that window layers never mix tokens of neighbouring sentences.
#[derive(Debug, Clone, PartialEq)]
pub enum Activation {
    /// Flat token ids, one per row of the eventual output.
    Ids { ids: Array1<TokenId>, lengths: Vec<usize> },
    /// One row per token.
    Dense { values: Array2<f32>, lengths: Vec<usize> },
}

impl Activation {
    /// Flattens `examples` into model input plus the flat gold tags.
    pub fn from_examples<'a, I>(examples: I, ops: Ops) -> (Activation, Array1<TagId>)
    where
        I: IntoIterator<Item = &'a Example>,
    {
        let examples: Vec<&Example> = examples.into_iter().collect();
        let lengths = crate::batch::lengths(examples.iter().copied());
        let (ids, tags) = ops.flatten(examples);
        (Activation::Ids { ids, lengths }, tags)
    }

    pub fn lengths(&self) -> &[usize] {
        match self {
            Activation::Ids { lengths, .. } | Activation::Dense { lengths, .. } => lengths,
        }
    }

    pub fn nr_rows(&self) -> usize {
        match self {
            Activation::Ids { ids, .. } => ids.len(),
            Activation::Dense { values, .. } => values.nrows(),
        }
    }

    pub fn ids(&self, layer: &str) -> Result<&Array1<TokenId>> {
        match self {
            Activation::Ids { ids, .. } => Ok(ids),
            Activation::Dense { .. } => Err(TaggerError::UnexpectedInput {
                layer: layer.to_string(),
                expected: "token id",
            }),
        }
    }

    pub fn dense(&self, layer: &str) -> Result<&Array2<f32>> {
        match self {
            Activation::Dense { values, .. } => Ok(values),
            Activation::Ids { .. } => Err(TaggerError::UnexpectedInput {
                layer: layer.to_string(),
                expected: "dense",
            }),
        }
    }

    pub fn into_dense(self, layer: &str) -> Result<Array2<f32>> {
        match self {
            Activation::Dense { values, .. } => Ok(values),
            Activation::Ids { .. } => Err(TaggerError::UnexpectedInput {
                layer: layer.to_string(),
                expected: "dense",
            }),
        }
    }
}

/// State a layer's forward pass leaves for its backward pass.
#[derive(Debug, Clone)]
pub enum LayerContext {
    Embed {
        ids: Array1<TokenId>,
    },
    Window {
        lengths: Vec<usize>,
    },
    WindowEncode {
        ids: Array1<TokenId>,
        lengths: Vec<usize>,
        windowed: Array2<f32>,
    },
    ReLu {
        input: Array2<f32>,
        output: Array2<f32>,
    },
    Softmax {
        input: Array2<f32>,
    },
    Chain(Vec<LayerContext>),
}

/// A unit mapping `nr_in`-wide rows to `nr_out`-wide rows.
///
/// `forward` is pure with respect to the weights. `backward` accumulates
/// parameter gradients into the layer's own buffers and returns the gradient
/// with respect to its input, or `None` when the input was token ids.
/// `update` hands every (parameter, gradient) pair to the optimizer.
pub trait Layer {
    fn layer_type(&self) -> &str;

    fn nr_in(&self) -> usize;

    fn nr_out(&self) -> usize;

    fn forward(&self, input: &Activation) -> Result<(Activation, LayerContext)>;

    fn backward(&mut self, context: LayerContext, grads: &Array2<f32>) -> Result<Option<Array2<f32>>>;

    fn update(&mut self, key: &ParamKey, optimizer: &mut Optimizer);

    fn zero_gradients(&mut self);

    fn parameters(&self) -> usize;

    /// Embedding table consumed by this layer, if it reads token ids.
    fn vectors(&self) -> Option<&VectorTable> {
        None
    }

    fn vectors_mut(&mut self) -> Option<&mut VectorTable> {
        None
    }
}

/// Declarative description of one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerConfig {
    /// Embeds ids, concatenates `n` neighbours each side, projects to `nr_out`.
    WindowEncode { nr_in: usize, nr_out: usize, n: usize },
    /// Embedding lookup followed by window extraction; output is `width * (2n + 1)`.
    EmbedExtractWindow { width: usize, n: usize },
    ReLu { nr_in: usize, nr_out: usize },
    Softmax { nr_in: usize, nr_out: usize },
}

impl LayerConfig {
    pub fn nr_in(&self) -> usize {
        match *self {
            LayerConfig::WindowEncode { nr_in, .. } => nr_in,
            LayerConfig::EmbedExtractWindow { width, .. } => width,
            LayerConfig::ReLu { nr_in, .. } | LayerConfig::Softmax { nr_in, .. } => nr_in,
        }
    }

    pub fn nr_out(&self) -> usize {
        match *self {
            LayerConfig::WindowEncode { nr_out, .. } => nr_out,
            LayerConfig::EmbedExtractWindow { width, n } => width * (2 * n + 1),
            LayerConfig::ReLu { nr_out, .. } | LayerConfig::Softmax { nr_out, .. } => nr_out,
        }
    }

    pub fn build(&self, rng: &mut StdRng) -> Result<Box<dyn Layer>> {
        let layer: Box<dyn Layer> = match *self {
            LayerConfig::WindowEncode { nr_in, nr_out, n } => Box::new(WindowEncode::new(nr_in, nr_out, n, rng)?),
            LayerConfig::EmbedExtractWindow { width, n } => {
                let embed: Box<dyn Layer> = Box::new(Embed::new(width, rng)?);
                let window: Box<dyn Layer> = Box::new(ExtractWindow::new(n, width));
                Box::new(Chain::new(vec![embed, window])?)
            }
            LayerConfig::ReLu { nr_in, nr_out } => Box::new(ReLu::new(nr_in, nr_out, rng)?),
            LayerConfig::Softmax { nr_in, nr_out } => Box::new(Softmax::new(nr_in, nr_out, rng)?),
        };
        Ok(layer)
    }
}

/// Checks that each layer consumes what the previous one produces, given the
/// `(nr_in, nr_out)` of every layer in order.
pub(crate) fn check_widths(widths: impl IntoIterator<Item = (usize, usize)>) -> Result<()> {
    let widths: Vec<(usize, usize)> = widths.into_iter().collect();
    for (i, pair) in widths.windows(2).enumerate() {
        let (expected, found) = (pair[0].1, pair[1].0);
        if expected != found {
            return Err(TaggerError::ShapeMismatch { layer: i + 1, expected, found });
        }
    }
    Ok(())
}

/// Everything `finish_update` needs from a `begin_update` call.
pub struct Backprop {
    contexts: Vec<LayerContext>,
    masks: Vec<Option<Array2<f32>>>,
}

pub struct Network {
    layers: Vec<Box<dyn Layer>>,
    rng: StdRng,
}

impl Network {
    /// Builds the stack described by `configs`, failing on the first width mismatch.
    pub fn from_configs(configs: &[LayerConfig], seed: Option<u64>) -> Result<Self> {
        if configs.is_empty() {
            return Err(TaggerError::EmptyNetwork);
        }
        check_widths(configs.iter().map(|c| (c.nr_in(), c.nr_out())))?;
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let layers = configs
            .iter()
            .map(|config| config.build(&mut rng))
            .collect::<Result<Vec<_>>>()?;
        Ok(Network { layers, rng })
    }

    /// Tagger with the stack chosen by `config`.
    pub fn new(config: &TaggerConfig, nr_class: usize, seed: Option<u64>) -> Result<Self> {
        config.validate()?;
        Self::from_configs(&config.layer_stack(nr_class), seed)
    }

    /// Wraps already constructed layers.
    pub fn from_layers(layers: Vec<Box<dyn Layer>>, rng: StdRng) -> Result<Self> {
        if layers.is_empty() {
            return Err(TaggerError::EmptyNetwork);
        }
        check_widths(layers.iter().map(|l| (l.nr_in(), l.nr_out())))?;
        Ok(Network { layers, rng })
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    /// Embedding width of the input layer.
    pub fn width(&self) -> usize {
        self.layers[0].nr_in()
    }

    pub fn nr_class(&self) -> usize {
        self.layers[self.layers.len() - 1].nr_out()
    }

    pub fn parameters(&self) -> usize {
        self.layers.iter().map(|l| l.parameters()).sum()
    }

    /// e.g. `WindowEncode(32→32) -> ReLu(32→32) -> ReLu(32→32) -> Softmax(32→17)`
    pub fn describe(&self) -> String {
        self.layers
            .iter()
            .map(|l| format!("{}({}→{})", l.layer_type(), l.nr_in(), l.nr_out()))
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    pub fn vectors(&self) -> Result<&VectorTable> {
        let first = &self.layers[0];
        first
            .vectors()
            .ok_or_else(|| TaggerError::NoVectorTable(first.layer_type().to_string()))
    }

    fn vectors_mut(&mut self) -> Result<&mut VectorTable> {
        let first = &mut self.layers[0];
        let name = first.layer_type().to_string();
        first.vectors_mut().ok_or(TaggerError::NoVectorTable(name))
    }

    /// Allocates a trainable vector for `id` in the input layer's table.
    /// Returns `false` if the id was already present.
    pub fn add_vector(&mut self, id: TokenId) -> Result<bool> {
        self.vectors_mut()?.add_vector(id)
    }

    /// Registers every token of `examples`; returns how many ids were new.
    pub fn register_vectors<'a, I>(&mut self, examples: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a Example>,
    {
        let table = self.vectors_mut()?;
        let mut added = 0;
        for example in examples {
            for &id in &example.tokens {
                if table.add_vector(id)? {
                    added += 1;
                }
            }
        }
        debug!(added, total = table.len(), "Registered vectors");
        Ok(added)
    }

    /// Forward pass for training. `drop` is the fraction of hidden activations
    /// zeroed; the classifier output is never dropped.
    pub fn begin_update(&mut self, input: &Activation, drop: f32) -> Result<(Array2<f32>, Backprop)> {
        if !(0.0..1.0).contains(&drop) {
            return Err(TaggerError::InvalidDropout(drop));
        }
        let last = self.layers.len() - 1;
        let mut contexts = Vec::with_capacity(self.layers.len());
        let mut masks = Vec::with_capacity(self.layers.len());
        let mut x = input.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            let (mut output, context) = layer.forward(&x)?;
            let mask = if i < last {
                if let Activation::Dense { values, .. } = &mut output {
                    let mask = dropout::mask(values.dim(), drop, &mut self.rng)?;
                    if let Some(mask) = &mask {
                        *values *= mask;
                    }
                    mask
                } else {
                    None
                }
            } else {
                None
            };
            contexts.push(context);
            masks.push(mask);
            x = output;
        }
        let guess = x.into_dense(self.layers[last].layer_type())?;
        Ok((guess, Backprop { contexts, masks }))
    }

    /// Backward pass from the gradient of the loss w.r.t. the classifier logits,
    /// then one optimizer step over every parameter.
    pub fn finish_update(&mut self, backprop: Backprop, gradient: &Array2<f32>, optimizer: &mut Optimizer) -> Result<()> {
        self.backward(backprop, gradient)?;
        for (i, layer) in self.layers.iter_mut().enumerate() {
            let key = ParamKey::new(i, layer.layer_type());
            layer.update(&key, optimizer);
        }
        optimizer.finish_update();
        Ok(())
    }

    /// Accumulates parameter gradients for `backprop` without applying them.
    pub fn backward(&mut self, backprop: Backprop, gradient: &Array2<f32>) -> Result<()> {
        let Backprop { contexts, masks } = backprop;
        let mut grads = gradient.clone();
        for ((layer, context), mask) in self.layers.iter_mut().zip(contexts).zip(masks).rev() {
            if let Some(mask) = &mask {
                grads *= mask;
            }
            match layer.backward(context, &grads)? {
                Some(d_input) => grads = d_input,
                None => break,
            }
        }
        Ok(())
    }

    /// Class probabilities, one row per token. Does not touch the weights.
    pub fn predict(&self, input: &Activation) -> Result<Array2<f32>> {
        let mut x = input.clone();
        for layer in &self.layers {
            x = layer.forward(&x)?.0;
        }
        x.into_dense(self.layers[self.layers.len() - 1].layer_type())
    }

    /// Most probable tag for every token of every example.
    pub fn predict_tags(&self, examples: &[Example], ops: Ops) -> Result<Vec<Vec<TagId>>> {
        let (input, _) = Activation::from_examples(examples, ops);
        let probs = self.predict(&input)?;
        let flat: Vec<TagId> = probs.rows().into_iter().map(|row| argmax(row.iter().copied())).collect();
        let mut start = 0;
        Ok(examples
            .iter()
            .map(|eg| {
                let tags = flat[start..start + eg.len()].to_vec();
                start += eg.len();
                tags
            })
            .collect())
    }

    pub fn zero_gradients(&mut self) {
        for layer in &mut self.layers {
            layer.zero_gradients();
        }
    }

    /// Runs `f` with a fresh trainer and optimizer. Gradient buffers are cleared
    /// before `f` runs and again when it returns, whether or not it failed.
    pub fn begin_training<F, T>(&mut self, config: &TrainConfig, f: F) -> Result<T>
    where
        F: FnOnce(&mut Network, &mut Trainer, &mut Optimizer) -> Result<T>,
    {
        config.validate()?;
        let mut trainer = Trainer::new(config);
        let mut optimizer = Optimizer::new(config.optimizer.clone());
        self.zero_gradients();
        let result = f(self, &mut trainer, &mut optimizer);
        self.zero_gradients();
        result
    }
}

/// Index of the largest value; the first one wins ties.
pub fn argmax(values: impl Iterator<Item = f32>) -> usize {
    let mut best = 0;
    let mut best_val = f32::NEG_INFINITY;
    for (i, v) in values.enumerate() {
        if v > best_val {
            best = i;
            best_val = v;
        }
    }
    best
}
