use itertools::Itertools;
use ndarray::Array1;
use rayon::prelude::*;
use serde::Deserialize;

use crate::error::{Result, TaggerError};

/// Index of a word in the embedding table.
pub type TokenId = u64;
/// Index of a part-of-speech class.
pub type TagId = usize;

/// One sentence: token ids aligned with gold tag ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Example {
    pub tokens: Vec<TokenId>,
    pub tags: Vec<TagId>,
}

impl Example {
    pub fn new(tokens: Vec<TokenId>, tags: Vec<TagId>) -> Result<Self> {
        if tokens.len() != tags.len() {
            return Err(TaggerError::LengthMismatch {
                tokens: tokens.len(),
                tags: tags.len(),
            });
        }
        Ok(Example { tokens, tags })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// How batches are concatenated. Chosen once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Ops {
    #[default]
    Serial,
    /// Concatenate with rayon; output order is unchanged.
    Parallel,
}

impl Ops {
    /// Concatenates token ids and tag ids of `examples` in order. No padding is
    /// added and sentence boundaries are dropped; see [`lengths`].
    pub fn flatten<'a, I>(self, examples: I) -> (Array1<TokenId>, Array1<TagId>)
    where
        I: IntoIterator<Item = &'a Example>,
    {
        let examples: Vec<&Example> = examples.into_iter().collect();
        match self {
            Ops::Serial => {
                let tokens = examples.iter().flat_map(|eg| eg.tokens.iter().copied()).collect_vec();
                let tags = examples.iter().flat_map(|eg| eg.tags.iter().copied()).collect_vec();
                (Array1::from(tokens), Array1::from(tags))
            }
            Ops::Parallel => {
                let (tokens, tags): (Vec<TokenId>, Vec<TagId>) = rayon::join(
                    || examples.par_iter().flat_map_iter(|eg| eg.tokens.iter().copied()).collect(),
                    || examples.par_iter().flat_map_iter(|eg| eg.tags.iter().copied()).collect(),
                );
                (Array1::from(tokens), Array1::from(tags))
            }
        }
    }
}

/// Serial [`Ops::flatten`].
pub fn flatten<'a, I>(examples: I) -> (Array1<TokenId>, Array1<TagId>)
where
    I: IntoIterator<Item = &'a Example>,
{
    Ops::Serial.flatten(examples)
}

/// Per-example sequence lengths, needed by window layers to respect sentence edges.
pub fn lengths<'a, I>(examples: I) -> Vec<usize>
where
    I: IntoIterator<Item = &'a Example>,
{
    examples.into_iter().map(Example::len).collect()
}
