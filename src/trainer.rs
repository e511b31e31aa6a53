//! Training loop: minibatch order, loss and gradient, validation scoring.

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::batch::{Example, Ops, TagId};
use crate::config::{TaggerConfig, TrainConfig};
use crate::error::{Result, TaggerError};
use crate::network::{argmax, Activation, Network};
use crate::optimizer::Optimizer;
use crate::profile::Profiler;

/// Summary of one pass over the training data.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochReport {
    pub epoch: usize,
    pub loss: f32,
    /// Moving average of the batch losses seen by the optimizer.
    pub averaged_loss: f32,
    pub accuracy: f32,
    pub learn_rate: f32,
}

pub struct Trainer {
    pub nb_epoch: usize,
    pub batch_size: usize,
    pub dropout: f32,
    pub ops: Ops,
    rng: StdRng,
}

impl Trainer {
    pub fn new(config: &TrainConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Trainer {
            nb_epoch: config.nb_epoch,
            batch_size: config.batch_size,
            dropout: config.dropout,
            ops: config.ops,
            rng,
        }
    }

    /// Shuffles the examples and splits them into minibatches for one epoch.
    pub fn epoch_batches<'a>(&mut self, examples: &'a [Example]) -> Vec<Vec<&'a Example>> {
        let mut order: Vec<&Example> = examples.iter().collect();
        order.shuffle(&mut self.rng);
        order.chunks(self.batch_size.max(1)).map(|chunk| chunk.to_vec()).collect()
    }

    /// Gradient of the mean cross-entropy with respect to the softmax logits,
    /// and the loss itself.
    pub fn get_gradient(&self, guess: &Array2<f32>, truth: &Array1<TagId>) -> Result<(Array2<f32>, f32)> {
        let (rows, nr_class) = guess.dim();
        if rows != truth.len() {
            return Err(TaggerError::BatchLengths { rows, total: truth.len() });
        }
        let n = rows.max(1) as f32;
        let mut gradient = guess.clone();
        let mut loss = 0.0;
        for (mut row, &tag) in gradient.rows_mut().into_iter().zip(truth.iter()) {
            if tag >= nr_class {
                return Err(TaggerError::TagOutOfRange { tag, nr_class });
            }
            loss -= row[tag].max(f32::MIN_POSITIVE).ln();
            row[tag] -= 1.0;
        }
        gradient /= n;
        Ok((gradient, loss / n))
    }

    /// Fraction of tokens whose most probable tag is the gold tag.
    pub fn score(&self, model: &Network, examples: &[Example]) -> Result<f32> {
        if examples.is_empty() {
            return Ok(0.0);
        }
        let (input, truth) = Activation::from_examples(examples, self.ops);
        let probs = model.predict(&input)?;
        let correct = probs
            .rows()
            .into_iter()
            .zip(truth.iter())
            .filter(|(row, tag)| argmax(row.iter().copied()) == **tag)
            .count();
        Ok(correct as f32 / truth.len().max(1) as f32)
    }

    /// One update on a minibatch; returns the batch loss.
    pub fn update(
        &self,
        model: &mut Network,
        optimizer: &mut Optimizer,
        batch: &[&Example],
        profiler: &mut Profiler,
    ) -> Result<f32> {
        let (examples, truth) = profiler.time("flatten", || Activation::from_examples(batch.iter().copied(), self.ops));
        let (guess, backprop) = profiler.time("forward", || model.begin_update(&examples, self.dropout))?;
        let (gradient, loss) = profiler.time("gradient", || self.get_gradient(&guess, &truth))?;
        optimizer.set_loss(loss);
        profiler.time("backward+update", || model.finish_update(backprop, &gradient, optimizer))?;
        Ok(loss)
    }

    /// Runs `nb_epoch` passes over `train`, scoring on `check` after each.
    pub fn train(
        &mut self,
        model: &mut Network,
        optimizer: &mut Optimizer,
        train: &[Example],
        check: &[Example],
        profiler: &mut Profiler,
    ) -> Result<Vec<EpochReport>> {
        let mut reports = Vec::with_capacity(self.nb_epoch);
        for epoch in 1..=self.nb_epoch {
            let batches = self.epoch_batches(train);
            let mut loss_sum = 0.0;
            for (i, batch) in batches.iter().enumerate() {
                let loss = self.update(model, optimizer, batch, profiler)?;
                loss_sum += loss;
                debug!(
                    epoch,
                    batch = i,
                    loss,
                    averaged_loss = optimizer.averaged_loss().unwrap_or(loss),
                    learn_rate = optimizer.learn_rate(),
                    "Batch done"
                );
            }
            let loss = loss_sum / batches.len().max(1) as f32;
            let accuracy = profiler.time("score", || self.score(model, check))?;
            let report = EpochReport {
                epoch,
                loss,
                averaged_loss: optimizer.averaged_loss().unwrap_or(loss),
                accuracy,
                learn_rate: optimizer.learn_rate(),
            };
            info!(
                epoch,
                loss = report.loss,
                averaged_loss = report.averaged_loss,
                accuracy = report.accuracy,
                learn_rate = report.learn_rate,
                "Epoch complete"
            );
            reports.push(report);
        }
        Ok(reports)
    }
}

/// Builds a tagger for `nr_class` tags, registers every training token in its
/// embedding table and trains it.
pub fn train_tagger(
    model_config: &TaggerConfig,
    train_config: &TrainConfig,
    train: &[Example],
    check: &[Example],
    nr_class: usize,
    profiler: &mut Profiler,
) -> Result<(Network, Vec<EpochReport>)> {
    let mut model = Network::new(model_config, nr_class, train_config.seed)?;
    let added = model.register_vectors(train)?;
    info!(
        model = %model.describe(),
        parameters = model.parameters(),
        vectors = added,
        "Model ready"
    );
    let reports = model.begin_training(train_config, |model, trainer, optimizer| {
        trainer.train(model, optimizer, train, check, profiler)
    })?;
    Ok((model, reports))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn trainer() -> Trainer {
        Trainer::new(&TrainConfig { seed: Some(3), batch_size: 2, ..TrainConfig::default() })
    }

    #[test]
    fn gradient_is_probs_minus_onehot() {
        let guess = array![[0.25, 0.75], [0.5, 0.5]];
        let (grad, loss) = trainer().get_gradient(&guess, &array![1, 0]).unwrap();
        assert_eq!(grad, array![[0.125, -0.125], [-0.25, 0.25]]);
        let expected = -(0.75f32.ln() + 0.5f32.ln()) / 2.0;
        assert!((loss - expected).abs() < 1e-6);
    }

    #[test]
    fn tag_outside_classes_is_rejected() {
        let guess = array![[0.5, 0.5]];
        assert!(matches!(
            trainer().get_gradient(&guess, &array![2]),
            Err(TaggerError::TagOutOfRange { tag: 2, nr_class: 2 })
        ));
    }

    #[test]
    fn batches_cover_every_example_once() {
        let data: Vec<Example> = (0..5).map(|i| Example::new(vec![i], vec![0]).unwrap()).collect();
        let batches = trainer().epoch_batches(&data);
        assert_eq!(batches.len(), 3);
        let mut seen: Vec<u64> = batches.iter().flatten().map(|eg| eg.tokens[0]).collect();
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }
}
