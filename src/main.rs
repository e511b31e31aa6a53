//! Trains a window-based part-of-speech tagger on a CoNLL-U corpus.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tagger::{
    train_tagger, Architecture, Config, ConllDataset, DatasetProvider, Ops, Profiler,
};

#[derive(Parser, Debug)]
#[command(name = "tagger")]
#[command(version)]
#[command(about = "Train a window-based part-of-speech tagger", long_about = None)]
struct Cli {
    /// JSON config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Training corpus (CoNLL-U)
    #[arg(long)]
    train: Option<PathBuf>,

    /// Validation corpus (CoNLL-U)
    #[arg(long)]
    dev: Option<PathBuf>,

    /// Input stage of the network
    #[arg(long, value_enum)]
    architecture: Option<Architecture>,

    /// Width of embeddings and hidden layers
    #[arg(long)]
    width: Option<usize>,

    /// Number of passes over the training data
    #[arg(long)]
    epochs: Option<usize>,

    /// Sentences per minibatch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Fraction of hidden activations zeroed during training
    #[arg(long)]
    dropout: Option<f32>,

    /// Initial learning rate
    #[arg(long)]
    learn_rate: Option<f32>,

    /// Linear learning-rate decay per update
    #[arg(long)]
    decay: Option<f32>,

    /// Random seed for reproducibility
    #[arg(short, long)]
    seed: Option<u64>,

    /// Words seen fewer times share the unknown-word vector
    #[arg(long)]
    min_freq: Option<usize>,

    /// Batch concatenation strategy
    #[arg(long, value_enum)]
    ops: Option<Ops>,

    /// Print a table of time spent per training phase
    #[arg(long)]
    profile: bool,
}

impl Cli {
    fn resolve(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => Config::default(),
        };
        if let Some(path) = &self.train {
            config.data.train_path = path.clone();
        }
        if let Some(path) = &self.dev {
            config.data.dev_path = path.clone();
        }
        if let Some(min_freq) = self.min_freq {
            config.data.min_freq = min_freq;
        }
        if let Some(architecture) = self.architecture {
            config.model.architecture = architecture;
        }
        if let Some(width) = self.width {
            config.model.width = width;
        }
        if let Some(epochs) = self.epochs {
            config.train.nb_epoch = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.train.batch_size = batch_size;
        }
        if let Some(dropout) = self.dropout {
            config.train.dropout = dropout;
        }
        if let Some(learn_rate) = self.learn_rate {
            config.train.optimizer.learn_rate = learn_rate;
        }
        if let Some(decay) = self.decay {
            config.train.optimizer.decay = decay;
        }
        if self.seed.is_some() {
            config.train.seed = self.seed;
        }
        if let Some(ops) = self.ops {
            config.train.ops = ops;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tagger=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.resolve()?;

    let provider = ConllDataset::new(
        config.data.train_path.clone(),
        config.data.dev_path.clone(),
        config.data.min_freq,
    );
    let (train, check, nr_class) = provider
        .load()
        .context("failed to load training data")?
        .into_parts();

    let mut profiler = Profiler::new(cli.profile);
    let (model, reports) = train_tagger(&config.model, &config.train, &train, &check, nr_class, &mut profiler)?;

    println!("Network architecture: {}", model.describe());
    println!("Total parameters: {}", model.parameters());
    if let Some(last) = reports.last() {
        println!("Validation accuracy after {} epochs: {:.2}%", last.epoch, last.accuracy * 100.0);
    }
    if profiler.is_enabled() {
        println!("\n{}", profiler.report());
    }
    Ok(())
}
