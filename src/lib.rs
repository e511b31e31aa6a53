pub mod adam;
pub mod affine;
pub mod batch;
pub mod chain;
pub mod config;
pub mod dataset_loader;
pub mod dropout;
pub mod embeddings;
pub mod error;
pub mod feed_forward;
pub mod network;
pub mod optimizer;
pub mod profile;
pub mod softmax;
pub mod trainer;
pub mod vocab;
pub mod window;
pub mod window_encode;
// Re-export key structs for easier access
pub use batch::{flatten, lengths, Example, Ops, TagId, TokenId};
pub use config::{Architecture, Config, OptimizerConfig, TaggerConfig, TrainConfig};
pub use dataset_loader::{ConllDataset, Dataset, DatasetProvider};
pub use embeddings::{Embed, VectorTable};
pub use error::{Result, TaggerError};
pub use network::{Activation, Layer, LayerConfig, LayerContext, Network};
pub use optimizer::Optimizer;
pub use profile::Profiler;
pub use trainer::{train_tagger, EpochReport, Trainer};
pub use vocab::{TagMap, Vocab};

// Constants
pub const DEFAULT_WIDTH: usize = 32;
pub const WINDOW_SIZE: usize = 1;
pub const DEFAULT_EPOCHS: usize = 10;
pub const DEFAULT_DROPOUT: f32 = 0.2;
