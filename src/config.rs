//! Configuration for the tagger model and its training run.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::batch::Ops;
use crate::error::{Result, TaggerError};
use crate::network::LayerConfig;
use crate::{DEFAULT_DROPOUT, DEFAULT_EPOCHS, DEFAULT_WIDTH, WINDOW_SIZE};

/// Which input stage the layer stack starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    /// Combined window-encoding embedding layer.
    Encode,
    /// Plain embedding lookup followed by explicit window extraction.
    Embed,
}

/// Model shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TaggerConfig {
    /// Input stage variant.
    pub architecture: Architecture,

    /// Width of embeddings and hidden layers.
    /// Default: 32.
    pub width: usize,

    /// Neighbours taken on each side when extracting windows.
    /// Default: 1.
    pub window: usize,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            architecture: Architecture::Encode,
            width: DEFAULT_WIDTH,
            window: WINDOW_SIZE,
        }
    }
}

impl TaggerConfig {
    /// Ordered layer configurations for a model predicting `nr_class` tags.
    pub fn layer_stack(&self, nr_class: usize) -> Vec<LayerConfig> {
        let width = self.width;
        let input = match self.architecture {
            Architecture::Encode => LayerConfig::WindowEncode {
                nr_in: width,
                nr_out: width,
                n: self.window,
            },
            Architecture::Embed => LayerConfig::EmbedExtractWindow {
                width,
                n: self.window,
            },
        };
        let input_width = input.nr_out();
        vec![
            input,
            LayerConfig::ReLu { nr_in: input_width, nr_out: width },
            LayerConfig::ReLu { nr_in: width, nr_out: width },
            LayerConfig::Softmax { nr_in: width, nr_out: nr_class },
        ]
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 {
            return Err(TaggerError::Config("width must be positive".into()));
        }
        Ok(())
    }
}

/// Optimizer hyper-parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Initial learning rate.
    pub learn_rate: f32,
    /// Linear decay factor: `lr / (1 + decay * nr_update)`.
    pub decay: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    /// L2 penalty added to every gradient.
    pub l2: f32,
    /// Clip gradients whose L2 norm exceeds this value. `0` disables clipping.
    pub max_grad_norm: f32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            learn_rate: 0.001,
            decay: 1e-4,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            l2: 1e-6,
            max_grad_norm: 10.0,
        }
    }
}

/// Training loop settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Number of passes over the training data.
    /// Default: 10.
    pub nb_epoch: usize,

    /// Examples per minibatch.
    pub batch_size: usize,

    /// Fraction of activations zeroed during training.
    /// Default: 0.2.
    pub dropout: f32,

    /// Random seed for shuffling, initialisation and dropout.
    /// Default: None (random).
    pub seed: Option<u64>,

    /// Which flattening implementation to use.
    pub ops: Ops,

    pub optimizer: OptimizerConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            nb_epoch: DEFAULT_EPOCHS,
            batch_size: 16,
            dropout: DEFAULT_DROPOUT,
            seed: None,
            ops: Ops::Serial,
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(TaggerError::Config("batch_size must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(TaggerError::InvalidDropout(self.dropout));
        }
        if self.optimizer.learn_rate <= 0.0 {
            return Err(TaggerError::Config("learn_rate must be positive".into()));
        }
        if self.optimizer.decay < 0.0 {
            return Err(TaggerError::Config("decay must not be negative".into()));
        }
        Ok(())
    }
}

/// Everything a run needs: data locations, model shape and training settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub model: TaggerConfig,
    pub train: TrainConfig,
}

/// Location of the CoNLL-U corpus.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub train_path: PathBuf,
    pub dev_path: PathBuf,
    /// Words rarer than this share the out-of-vocabulary id.
    /// Default: 5.
    pub min_freq: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            train_path: PathBuf::from("data/es_ancora-ud-train.conllu"),
            dev_path: PathBuf::from("data/es_ancora-ud-dev.conllu"),
            min_freq: 5,
        }
    }
}

impl Config {
    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TaggerError::FileNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        self.train.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"model": {"architecture": "embed"}, "train": {"nb_epoch": 3}}"#)
                .unwrap();
        assert_eq!(config.model.architecture, Architecture::Embed);
        assert_eq!(config.model.width, DEFAULT_WIDTH);
        assert_eq!(config.train.nb_epoch, 3);
        assert_eq!(config.train.dropout, DEFAULT_DROPOUT);
        assert_eq!(config.data.min_freq, 5);
    }

    #[test]
    fn dropout_of_one_is_rejected() {
        let config = TrainConfig { dropout: 1.0, ..TrainConfig::default() };
        assert!(matches!(config.validate(), Err(TaggerError::InvalidDropout(_))));
    }

    #[test]
    fn embed_stack_triples_input_width() {
        let config = TaggerConfig { architecture: Architecture::Embed, ..TaggerConfig::default() };
        let stack = config.layer_stack(7);
        assert_eq!(stack[0].nr_out(), 3 * DEFAULT_WIDTH);
        assert_eq!(stack[1].nr_in(), 3 * DEFAULT_WIDTH);
        assert_eq!(stack.last().unwrap().nr_out(), 7);
    }
}
