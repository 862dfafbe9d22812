// Copyright (c) 2025 nnsearch Contributors
// Licensed under the nnsearch License. See LICENSE file for details.

//! Nearest-word lookup over a text file of word vectors.
//!
//! The input holds one word per line followed by its vector components:
//!
//! ```text
//! king 0.50 0.68 -0.59
//! queen 0.38 0.18 -0.35
//! ```
//!
//! Words are sorted, so row `i` of the dataset is the `i`-th word in
//! lexicographic order. [`WordVectors::open`] caches the built index next to
//! the data as `<stem>.ann.index` and reuses it on later opens.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::builder::IndexBuilder;
use crate::dataset::Dataset;
use crate::error::{AnnError, Result};
use crate::index::Index;
use crate::params::{Checks, IndexParams};
use crate::persistence;

/// Check budget used for every word lookup.
pub const WORD_SEARCH_CHECKS: usize = 1024;

/// Extension of the cached index file.
pub const INDEX_EXTENSION: &str = "ann.index";

/// Field separator of a word-vector file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delimiter {
    /// Any run of whitespace.
    #[default]
    Whitespace,
    /// A single tab character.
    Tab,
}

/// Sorted vocabulary and its vectors, one dataset row per word.
#[derive(Debug, Clone)]
pub struct WordTable {
    words: Vec<String>,
    dataset: Dataset,
}

impl WordTable {
    /// Parse a word-vector text file.
    ///
    /// Blank lines are skipped and a repeated word keeps its last vector.
    ///
    /// # Errors
    ///
    /// - [`AnnError::Parse`] for a line with no values or a non-numeric value
    /// - [`AnnError::InvalidDataset`] when vector lengths disagree or the file is empty
    pub fn from_text(path: impl AsRef<Path>, delimiter: Delimiter) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file), delimiter)
    }

    pub fn from_reader<R: BufRead>(reader: R, delimiter: Delimiter) -> Result<Self> {
        let mut vectors: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut dim = None;

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let number = i + 1;
            let mut fields: Box<dyn Iterator<Item = &str>> = match delimiter {
                Delimiter::Whitespace => Box::new(line.split_whitespace()),
                Delimiter::Tab => Box::new(line.split('\t').filter(|f| !f.is_empty())),
            };
            let Some(word) = fields.next() else {
                continue;
            };
            if word.trim().is_empty() {
                continue;
            }

            let values = fields
                .map(|field| {
                    let value: f64 = field.trim().parse().map_err(|e| AnnError::Parse {
                        line: number,
                        message: format!("invalid value {:?}: {}", field, e),
                    })?;
                    if !value.is_finite() {
                        return Err(AnnError::Parse {
                            line: number,
                            message: format!("non-finite value {:?}", field),
                        });
                    }
                    Ok(value)
                })
                .collect::<Result<Vec<f64>>>()?;
            if values.is_empty() {
                return Err(AnnError::Parse {
                    line: number,
                    message: format!("word {:?} has no vector", word),
                });
            }

            match dim {
                None => dim = Some(values.len()),
                Some(d) if d != values.len() => {
                    return Err(AnnError::InvalidDataset(format!(
                        "line {}: vector has {} values, expected {}",
                        number,
                        values.len(),
                        d
                    )))
                }
                Some(_) => {}
            }
            vectors.insert(word.to_string(), values);
        }

        let cols = dim.unwrap_or(0);
        let rows = vectors.len();
        let mut words = Vec::with_capacity(rows);
        let mut data = Vec::with_capacity(rows * cols);
        for (word, values) in vectors {
            words.push(word);
            data.extend(values);
        }
        let dataset = Dataset::new(data, rows, cols)?;
        Ok(Self { words, dataset })
    }

    /// Words in row order.
    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }
}

/// Word vectors with a nearest-neighbour index over them.
#[derive(Debug, Clone)]
pub struct WordVectors {
    words: Vec<String>,
    rows: BTreeMap<String, usize>,
    index: Index,
}

impl WordVectors {
    /// Path of the cached index for a data file: `vectors.txt` → `vectors.ann.index`.
    pub fn index_path(data: impl AsRef<Path>) -> PathBuf {
        data.as_ref().with_extension(INDEX_EXTENSION)
    }

    /// Parse `path`, then load the cached index next to it or build and cache one.
    ///
    /// A cache that no longer matches the data (different shape, or corrupt)
    /// is rebuilt and overwritten.
    pub fn open(path: impl AsRef<Path>, params: IndexParams, delimiter: Delimiter) -> Result<Self> {
        Self::open_with(path, &IndexBuilder::new(params), delimiter)
    }

    /// Like [`WordVectors::open`], building any missing index with `builder`.
    pub fn open_with(
        path: impl AsRef<Path>,
        builder: &IndexBuilder,
        delimiter: Delimiter,
    ) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading word vectors");
        let table = WordTable::from_text(path, delimiter)?;
        let cache = Self::index_path(path);

        let index = if cache.exists() {
            match persistence::load(&cache, table.dataset()) {
                Ok(index) => index,
                Err(
                    e @ (AnnError::DimensionMismatch { .. }
                    | AnnError::RowCountMismatch { .. }
                    | AnnError::CorruptIndexFile(_)),
                ) => {
                    warn!(path = %cache.display(), error = %e, "stale index cache, rebuilding");
                    Self::build_and_cache(&table, builder, &cache)?
                }
                Err(e) => return Err(e),
            }
        } else {
            Self::build_and_cache(&table, builder, &cache)?
        };
        Self::with_index(table, index)
    }

    fn build_and_cache(table: &WordTable, builder: &IndexBuilder, cache: &Path) -> Result<Index> {
        let index = builder.build(table.dataset())?;
        persistence::save(&index, cache)?;
        Ok(index)
    }

    /// Pair a table with an index built over its dataset.
    pub fn with_index(table: WordTable, index: Index) -> Result<Self> {
        if index.dim() != table.dataset.cols() {
            return Err(AnnError::DimensionMismatch {
                expected: index.dim(),
                got: table.dataset.cols(),
            });
        }
        if index.rows() != table.dataset.rows() {
            return Err(AnnError::RowCountMismatch {
                expected: index.rows(),
                got: table.dataset.rows(),
            });
        }
        let rows = table
            .words
            .iter()
            .enumerate()
            .map(|(i, w)| (w.clone(), i))
            .collect();
        Ok(Self {
            words: table.words,
            rows,
            index,
        })
    }

    /// Up to `n` nearest words to `word`, nearest first, the word itself included.
    /// Unknown words yield an empty list.
    pub fn nearest(&self, word: &str, n: usize) -> Result<Vec<(String, f64)>> {
        let Some(vector) = self.vector(word) else {
            return Ok(Vec::new());
        };
        self.nearest_to_vector(vector, n)
    }

    /// Up to `n` nearest words to an arbitrary vector.
    pub fn nearest_to_vector(&self, vector: &[f64], n: usize) -> Result<Vec<(String, f64)>> {
        let k = n.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }
        let hits = self
            .index
            .knn(vector, k, Checks::Limited(WORD_SEARCH_CHECKS))?;
        Ok(hits
            .into_iter()
            .map(|hit| (self.words[hit.index].clone(), hit.distance))
            .collect())
    }

    pub fn vector(&self, word: &str) -> Option<&[f64]> {
        let &row = self.rows.get(word)?;
        self.index.dataset().row(row).ok()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.rows.contains_key(word)
    }

    /// Vocabulary size.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Words in row order.
    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn index(&self) -> &Index {
        &self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_sorts_and_dedups() {
        let text = "zebra 1 1\napple 0 0\n\nmango 2 2\napple 0.5 0.5\n";
        let table = WordTable::from_reader(Cursor::new(text), Delimiter::Whitespace).unwrap();
        assert_eq!(table.words(), &["apple", "mango", "zebra"]);
        assert_eq!(table.dataset().row(0).unwrap(), &[0.5, 0.5]);
        assert_eq!(table.dataset().row(2).unwrap(), &[1.0, 1.0]);
    }

    #[test]
    fn test_parse_tab_delimited() {
        let text = "new york\t1.0\t2.0\nparis\t3.0\t4.0\n";
        let table = WordTable::from_reader(Cursor::new(text), Delimiter::Tab).unwrap();
        assert_eq!(table.words(), &["new york", "paris"]);
        assert_eq!(table.dataset().cols(), 2);
    }

    #[test]
    fn test_parse_errors() {
        let parse = |text: &str| {
            WordTable::from_reader(Cursor::new(text.to_string()), Delimiter::Whitespace)
                .unwrap_err()
        };
        assert!(matches!(parse("a 1 x\n"), AnnError::Parse { line: 1, .. }));
        assert!(matches!(parse("a 1 2\nb 1\n"), AnnError::InvalidDataset(_)));
        assert!(matches!(parse("a 1\nlonely\n"), AnnError::Parse { line: 2, .. }));

        let err = parse("\n\n");
        assert!(matches!(err, AnnError::InvalidDataset(_)));
    }

    #[test]
    fn test_index_path() {
        assert_eq!(
            WordVectors::index_path("/data/glove.txt"),
            PathBuf::from("/data/glove.ann.index")
        );
        assert_eq!(
            WordVectors::index_path("vectors"),
            PathBuf::from("vectors.ann.index")
        );
    }

    #[test]
    fn test_nearest_in_memory() {
        let text = "a 0 0\nb 1 0\nc 5 5\nd 0.5 0\n";
        let table = WordTable::from_reader(Cursor::new(text), Delimiter::Whitespace).unwrap();
        let index = IndexBuilder::new(IndexParams::Linear).build(table.dataset()).unwrap();
        let words = WordVectors::with_index(table, index).unwrap();

        let near = words.nearest("a", 2).unwrap();
        assert_eq!(near[0].0, "a");
        assert_eq!(near[1].0, "d");
        assert!((near[1].1 - 0.5).abs() < 1e-12);

        assert!(words.nearest("missing", 3).unwrap().is_empty());
        assert_eq!(words.nearest("c", 10).unwrap().len(), 4);
        assert!(words.contains("b"));
        assert_eq!(words.vector("b"), Some(&[1.0, 0.0][..]));
    }
}
