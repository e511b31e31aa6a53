use ndarray::Array2;

use crate::embeddings::VectorTable;
use crate::error::{Result, TaggerError};
use crate::network::{check_widths, Activation, Layer, LayerContext};
use crate::optimizer::{Optimizer, ParamKey};

/// Sub-pipeline that behaves as a single layer.
pub struct Chain {
    layers: Vec<Box<dyn Layer>>,
    name: String,
}

impl Chain {
    pub fn new(layers: Vec<Box<dyn Layer>>) -> Result<Self> {
        if layers.is_empty() {
            return Err(TaggerError::EmptyNetwork);
        }
        check_widths(layers.iter().map(|l| (l.nr_in(), l.nr_out())))?;
        let name = layers.iter().map(|l| l.layer_type()).collect::<Vec<_>>().join("+");
        Ok(Chain { layers, name })
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }
}

impl Layer for Chain {
    fn layer_type(&self) -> &str {
        &self.name
    }

    fn nr_in(&self) -> usize {
        self.layers[0].nr_in()
    }

    fn nr_out(&self) -> usize {
        self.layers[self.layers.len() - 1].nr_out()
    }

    fn forward(&self, input: &Activation) -> Result<(Activation, LayerContext)> {
        let mut contexts = Vec::with_capacity(self.layers.len());
        let mut x = input.clone();
        for layer in &self.layers {
            let (output, context) = layer.forward(&x)?;
            contexts.push(context);
            x = output;
        }
        Ok((x, LayerContext::Chain(contexts)))
    }

    fn backward(&mut self, context: LayerContext, grads: &Array2<f32>) -> Result<Option<Array2<f32>>> {
        let LayerContext::Chain(contexts) = context else {
            return Err(TaggerError::ContextMismatch(self.name.clone()));
        };
        let mut grads = grads.clone();
        for (layer, context) in self.layers.iter_mut().zip(contexts).rev() {
            match layer.backward(context, &grads)? {
                Some(d_input) => grads = d_input,
                None => return Ok(None),
            }
        }
        Ok(Some(grads))
    }

    fn update(&mut self, key: &ParamKey, optimizer: &mut Optimizer) {
        for (i, layer) in self.layers.iter_mut().enumerate() {
            layer.update(&key.child(&i.to_string()), optimizer);
        }
    }

    fn zero_gradients(&mut self) {
        for layer in &mut self.layers {
            layer.zero_gradients();
        }
    }

    fn parameters(&self) -> usize {
        self.layers.iter().map(|l| l.parameters()).sum()
    }

    fn vectors(&self) -> Option<&VectorTable> {
        self.layers[0].vectors()
    }

    fn vectors_mut(&mut self) -> Option<&mut VectorTable> {
        self.layers[0].vectors_mut()
    }
}
