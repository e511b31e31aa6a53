//! Parameter updates for the whole network.
//!
//! Layers accumulate gradients into their own buffers during the backward pass and
//! then hand each (parameter, gradient) pair to [`Optimizer::step`], which applies
//! the L2 penalty, gradient clipping and an Adam update at the scheduled learning
//! rate, then zeroes the gradient.

use std::collections::HashMap;

use ndarray::Array2;

use crate::adam::Adam;
use crate::config::OptimizerConfig;

/// Identifies a parameter tensor: owning layer index plus parameter name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamKey {
    pub layer: usize,
    pub name: String,
}

impl ParamKey {
    pub fn new(layer: usize, name: impl Into<String>) -> Self {
        ParamKey { layer, name: name.into() }
    }

    /// Key for a parameter of a nested layer.
    pub fn child(&self, name: &str) -> Self {
        ParamKey {
            layer: self.layer,
            name: format!("{}.{}", self.name, name),
        }
    }
}

/// `rate / (1 + decay * nr_upd)`
pub fn linear_decay(rate: f32, decay: f32, nr_upd: usize) -> f32 {
    rate / (1.0 + decay * nr_upd as f32)
}

pub struct Optimizer {
    config: OptimizerConfig,
    nr_update: usize,
    moments: HashMap<ParamKey, Adam>,
    last_loss: Option<f32>,
    averaged_loss: Option<f32>,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Optimizer {
            config,
            nr_update: 0,
            moments: HashMap::new(),
            last_loss: None,
            averaged_loss: None,
        }
    }

    /// Learning rate for the current update.
    pub fn learn_rate(&self) -> f32 {
        linear_decay(self.config.learn_rate, self.config.decay, self.nr_update)
    }

    pub fn nr_update(&self) -> usize {
        self.nr_update
    }

    /// Records the loss of the batch about to be applied.
    pub fn set_loss(&mut self, loss: f32) {
        self.last_loss = Some(loss);
        self.averaged_loss = Some(match self.averaged_loss {
            Some(avg) => 0.9 * avg + 0.1 * loss,
            None => loss,
        });
    }

    pub fn last_loss(&self) -> Option<f32> {
        self.last_loss
    }

    /// Exponential moving average of the losses passed to [`Optimizer::set_loss`].
    pub fn averaged_loss(&self) -> Option<f32> {
        self.averaged_loss
    }

    /// Advances the schedule. Called once per minibatch, after every layer has
    /// been stepped.
    pub fn finish_update(&mut self) {
        self.nr_update += 1;
    }

    /// Updates `params` from `grads` and zeroes `grads`.
    pub fn step(&mut self, key: ParamKey, params: &mut Array2<f32>, grads: &mut Array2<f32>) {
        let lr = self.learn_rate();
        let OptimizerConfig {
            beta1,
            beta2,
            epsilon,
            l2,
            max_grad_norm,
            ..
        } = self.config;

        if l2 > 0.0 {
            grads.scaled_add(l2, &*params);
        }
        if max_grad_norm > 0.0 {
            let norm = grads.iter().map(|g| g * g).sum::<f32>().sqrt();
            if norm > max_grad_norm {
                *grads *= max_grad_norm / norm;
            }
        }

        let adam = self
            .moments
            .entry(key)
            .or_insert_with(|| Adam::new(params.dim(), beta1, beta2, epsilon));
        // embedding tables may have grown since the moments were allocated
        if adam.shape() != params.dim() {
            adam.grow_rows(params.nrows());
        }
        adam.step(params, grads, lr);
        grads.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_moves_against_gradient_and_clears_it() {
        let mut opt = Optimizer::new(OptimizerConfig { l2: 0.0, ..OptimizerConfig::default() });
        let mut w = Array2::from_elem((2, 2), 1.0);
        let mut g = Array2::from_elem((2, 2), 0.5);
        opt.step(ParamKey::new(0, "W"), &mut w, &mut g);
        assert!(w.iter().all(|&x| x < 1.0));
        assert!(g.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn learn_rate_decays_linearly() {
        let config = OptimizerConfig { learn_rate: 1.0, decay: 0.5, ..OptimizerConfig::default() };
        let mut opt = Optimizer::new(config);
        assert_eq!(opt.learn_rate(), 1.0);
        opt.finish_update();
        opt.finish_update();
        assert!((opt.learn_rate() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn averaged_loss_is_exponential_moving_average() {
        let mut opt = Optimizer::new(OptimizerConfig::default());
        assert_eq!(opt.averaged_loss(), None);
        opt.set_loss(2.0);
        assert_eq!(opt.averaged_loss(), Some(2.0));
        opt.set_loss(1.0);
        assert_eq!(opt.last_loss(), Some(1.0));
        assert!((opt.averaged_loss().unwrap() - 1.9).abs() < 1e-6);
    }

    #[test]
    fn grown_table_keeps_existing_moments() {
        let config = OptimizerConfig { l2: 0.0, max_grad_norm: 0.0, ..OptimizerConfig::default() };
        let mut opt = Optimizer::new(config);
        let key = ParamKey::new(0, "vectors");
        let mut w = Array2::from_elem((2, 3), 1.0);
        let mut g = Array2::from_elem((2, 3), 0.5);
        opt.step(key.clone(), &mut w, &mut g);
        let after_first = w.clone();

        w.push_row(ndarray::aview1(&[1.0, 1.0, 1.0])).unwrap();
        let mut g = Array2::zeros((3, 3));
        g.row_mut(2).fill(1.0);
        opt.step(key.clone(), &mut w, &mut g);

        let adam = &opt.moments[&key];
        assert_eq!(adam.shape(), (3, 3));
        // first moment of the old rows decays instead of restarting from zero
        assert!(adam.m.row(0).iter().all(|&m| (m - 0.045).abs() < 1e-6));
        assert!(adam.m.row(2).iter().all(|&m| (m - 0.1).abs() < 1e-6));
        assert!(w.row(2).iter().all(|&x| x < 1.0));
        assert!(w.row(0).iter().zip(after_first.row(0)).all(|(now, before)| now < before));
    }
}
