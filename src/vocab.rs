use std::collections::HashMap;

use crate::batch::{TagId, TokenId};

/// Word vocabulary. Frequent words get their own id; the rest share [`Vocab::oov`].
#[derive(Clone, Debug, Default)]
pub struct Vocab {
    pub encode: HashMap<String, TokenId>,
    pub words: Vec<String>,
}

impl Vocab {
    /// Builds a vocabulary from word counts, keeping words seen at least `min_freq`
    /// times. Ids are assigned by descending frequency, ties in first-seen order.
    pub fn from_counts<'a, I>(words: I, min_freq: usize) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut order: Vec<&str> = Vec::new();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for word in words {
            let count = counts.entry(word).or_insert_with(|| {
                order.push(word);
                0
            });
            *count += 1;
        }

        let mut kept: Vec<(usize, &str)> = order
            .into_iter()
            .enumerate()
            .filter(|(_, w)| counts[w] >= min_freq)
            .collect();
        // stable sort keeps first-seen order among equal counts
        kept.sort_by(|(_, a), (_, b)| counts[b].cmp(&counts[a]));

        let words: Vec<String> = kept.into_iter().map(|(_, w)| w.to_string()).collect();
        let encode = words
            .iter()
            .enumerate()
            .map(|(i, w)| (w.clone(), i as TokenId))
            .collect();
        Vocab { encode, words }
    }

    /// Id shared by every word not in the vocabulary.
    pub fn oov(&self) -> TokenId {
        self.words.len() as TokenId
    }

    pub fn encode(&self, word: &str) -> TokenId {
        self.encode.get(word).copied().unwrap_or_else(|| self.oov())
    }

    pub fn decode(&self, id: TokenId) -> Option<&str> {
        self.words.get(id as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Tag names mapped to class ids in first-seen order.
#[derive(Clone, Debug, Default)]
pub struct TagMap {
    pub encode: HashMap<String, TagId>,
    pub tags: Vec<String>,
}

impl TagMap {
    /// Returns the id of `tag`, assigning the next free id if it is new.
    pub fn insert(&mut self, tag: &str) -> TagId {
        if let Some(&id) = self.encode.get(tag) {
            return id;
        }
        let id = self.tags.len();
        self.tags.push(tag.to_string());
        self.encode.insert(tag.to_string(), id);
        id
    }

    pub fn get(&self, tag: &str) -> Option<TagId> {
        self.encode.get(tag).copied()
    }

    pub fn decode(&self, id: TagId) -> Option<&str> {
        self.tags.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rare_words_share_oov() {
        let text = "el gato y el perro y el pez";
        let vocab = Vocab::from_counts(text.split_whitespace(), 2);
        assert_eq!(vocab.words, vec!["el", "y"]);
        assert_eq!(vocab.encode("el"), 0);
        assert_eq!(vocab.encode("gato"), vocab.oov());
        assert_eq!(vocab.encode("unseen"), 2);
        assert_eq!(vocab.decode(1), Some("y"));
    }

    #[test]
    fn tag_ids_follow_first_occurrence() {
        let mut tags = TagMap::default();
        assert_eq!(tags.insert("DET"), 0);
        assert_eq!(tags.insert("NOUN"), 1);
        assert_eq!(tags.insert("DET"), 0);
        assert_eq!(tags.len(), 2);
        assert_eq!(tags.get("VERB"), None);
    }
}
