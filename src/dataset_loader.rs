use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::batch::Example;
use crate::error::{Result, TaggerError};
use crate::vocab::{TagMap, Vocab};

/// Labeled sentences ready for training.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub train: Vec<Example>,
    pub check: Vec<Example>,
    pub nr_class: usize,
    pub vocab: Vocab,
    pub tags: TagMap,
}

impl Dataset {
    /// Train set, validation set and number of classes.
    pub fn into_parts(self) -> (Vec<Example>, Vec<Example>, usize) {
        (self.train, self.check, self.nr_class)
    }
}

/// Source of training and validation examples.
pub trait DatasetProvider {
    fn load(&self) -> Result<Dataset>;
}

/// Reads part-of-speech data from a pair of CoNLL-U files.
#[derive(Debug, Clone)]
pub struct ConllDataset {
    pub train_path: PathBuf,
    pub dev_path: PathBuf,
    pub min_freq: usize,
}

/// One sentence as word forms and tag strings.
type TaggedSentence = (Vec<String>, Vec<String>);

impl ConllDataset {
    pub fn new(train_path: impl Into<PathBuf>, dev_path: impl Into<PathBuf>, min_freq: usize) -> Self {
        ConllDataset {
            train_path: train_path.into(),
            dev_path: dev_path.into(),
            min_freq,
        }
    }
}

impl DatasetProvider for ConllDataset {
    fn load(&self) -> Result<Dataset> {
        let train_sents = read_conll(&self.train_path)?;
        let dev_sents = read_conll(&self.dev_path)?;

        let mut tags = TagMap::default();
        for (_, sent_tags) in &train_sents {
            for tag in sent_tags {
                tags.insert(tag);
            }
        }
        let vocab = Vocab::from_counts(
            train_sents.iter().flat_map(|(words, _)| words.iter().map(String::as_str)),
            self.min_freq,
        );

        let train = encode(&train_sents, &vocab, &tags)?;
        let check = encode(&dev_sents, &vocab, &tags)?;
        info!(
            train = train.len(),
            check = check.len(),
            vocab = vocab.len(),
            nr_class = tags.len(),
            "Loaded CoNLL-U data"
        );
        Ok(Dataset {
            train,
            check,
            nr_class: tags.len(),
            vocab,
            tags,
        })
    }
}

fn encode(sents: &[TaggedSentence], vocab: &Vocab, tags: &TagMap) -> Result<Vec<Example>> {
    sents
        .iter()
        .map(|(words, sent_tags)| {
            let tokens = words.iter().map(|w| vocab.encode(w)).collect();
            let tag_ids = sent_tags
                .iter()
                .map(|t| tags.get(t).ok_or_else(|| TaggerError::UnknownTag(t.clone())))
                .collect::<Result<Vec<_>>>()?;
            Example::new(tokens, tag_ids)
        })
        .collect()
}

/// Parses a CoNLL-U file into sentences of (form, UPOS) pairs.
pub fn read_conll(path: &Path) -> Result<Vec<TaggedSentence>> {
    if !path.exists() {
        return Err(TaggerError::FileNotFound(path.to_path_buf()));
    }
    let reader = BufReader::new(File::open(path)?);
    parse_conll(reader, path)
}

fn parse_conll<R: BufRead>(reader: R, path: &Path) -> Result<Vec<TaggedSentence>> {
    let mut sents = Vec::new();
    let mut words = Vec::new();
    let mut tags = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim_end();
        if line.is_empty() {
            if !words.is_empty() {
                sents.push((std::mem::take(&mut words), std::mem::take(&mut tags)));
            }
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 4 {
            return Err(TaggerError::Dataset {
                path: path.to_path_buf(),
                line: i + 1,
                message: format!("expected at least 4 columns, found {}", fields.len()),
            });
        }
        // multiword ranges and empty nodes carry no tag of their own
        if fields[0].contains('-') || fields[0].contains('.') {
            continue;
        }
        words.push(fields[1].to_string());
        tags.push(fields[3].to_string());
    }
    if !words.is_empty() {
        sents.push((words, tags));
    }
    Ok(sents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_comments_ranges_and_empty_nodes() {
        let text = "# sent_id = 1\n\
                    1-2\tdel\t_\t_\n\
                    1\tde\tde\tADP\n\
                    2\tel\tel\tDET\n\
                    2.1\tx\tx\tX\n\
                    3\tgato\tgato\tNOUN\n\
                    \n\
                    1\tCorre\tcorrer\tVERB\n";
        let sents = parse_conll(text.as_bytes(), Path::new("mem")).unwrap();
        assert_eq!(sents.len(), 2);
        assert_eq!(sents[0].0, vec!["de", "el", "gato"]);
        assert_eq!(sents[0].1, vec!["ADP", "DET", "NOUN"]);
        assert_eq!(sents[1].1, vec!["VERB"]);
    }

    #[test]
    fn short_line_reports_position() {
        let err = parse_conll("1\tsolo\n".as_bytes(), Path::new("mem")).unwrap_err();
        assert!(matches!(err, TaggerError::Dataset { line: 1, .. }));
    }
}
