//! Fuzzy instrument index.
//!
//! Scores every catalog entry against a query over `symbol`, `name` and
//! `short_name`. Each field is matched as a whole and token by token with an
//! approximate-substring edit distance:
//!
//! ```text
//! score = errors / query_len + offset / distance + norm
//! ```
//!
//! where `norm` is a small penalty growing with the length difference between
//! query and field, so that `TCS` beats `TCSL` for the query `tcs`. A field
//! equal to the query (case-insensitive) scores exactly 0. Entries whose best
//! field score exceeds `threshold` are dropped.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tickwire_core::Instrument;
use tracing::debug;

/// Weight of the length-difference term. Kept well below any single edit
/// error so that it only orders otherwise equal matches.
const LENGTH_NORM_WEIGHT: f64 = 0.01;

/// Search tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum accepted score (0 = exact only, 1 = anything).
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Characters of offset that cost one full error.
    #[serde(default = "default_distance")]
    pub distance: usize,
    /// Result cap used when the caller has no preference.
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Quiet period before a typed query is searched.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_threshold() -> f64 {
    0.3
}

fn default_distance() -> usize {
    100
}

fn default_limit() -> usize {
    10
}

fn default_debounce_ms() -> u64 {
    300
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            distance: default_distance(),
            default_limit: default_limit(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl SearchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug)]
struct IndexedField {
    lower: String,
    chars: Vec<char>,
    tokens: Vec<Vec<char>>,
}

impl IndexedField {
    fn new(text: &str) -> Option<Self> {
        let lower = text.trim().to_lowercase();
        if lower.is_empty() {
            return None;
        }
        let tokens = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.chars().collect())
            .collect();
        Some(Self {
            chars: lower.chars().collect(),
            lower,
            tokens,
        })
    }

    fn score(&self, query: &str, pattern: &[char], distance: usize) -> f64 {
        if self.lower == query {
            return 0.0;
        }

        let mut best = match_score(pattern, &self.chars, distance);
        for token in &self.tokens {
            best = best.min(match_score(pattern, token, distance));
        }

        let (short, long) = if pattern.len() <= self.chars.len() {
            (pattern.len(), self.chars.len())
        } else {
            (self.chars.len(), pattern.len())
        };
        best + LENGTH_NORM_WEIGHT * (1.0 - short as f64 / long as f64)
    }
}

#[derive(Debug)]
struct IndexedEntry {
    fields: Vec<IndexedField>,
}

/// Immutable search index over one catalog snapshot.
#[derive(Debug)]
pub struct InstrumentIndex {
    catalog: Arc<[Instrument]>,
    entries: Vec<IndexedEntry>,
    config: SearchConfig,
}

impl InstrumentIndex {
    pub fn build(catalog: Arc<[Instrument]>, config: SearchConfig) -> Self {
        let entries = catalog
            .iter()
            .map(|inst| IndexedEntry {
                fields: [
                    Some(inst.symbol.as_str()),
                    Some(inst.name.as_str()),
                    inst.short_name.as_deref(),
                ]
                .into_iter()
                .flatten()
                .filter_map(IndexedField::new)
                .collect(),
            })
            .collect();

        debug!(instruments = catalog.len(), "Instrument index built");
        Self {
            catalog,
            entries,
            config,
        }
    }

    /// Catalog this index was built from.
    pub fn catalog(&self) -> &Arc<[Instrument]> {
        &self.catalog
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    /// Best matches first, at most `limit`. An empty query returns nothing.
    pub fn search(&self, query: &str, limit: usize) -> Vec<Instrument> {
        let query = query.trim().to_lowercase();
        if query.is_empty() || limit == 0 || self.catalog.is_empty() {
            return Vec::new();
        }
        let pattern: Vec<char> = query.chars().collect();

        let mut scored: Vec<(usize, f64)> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| {
                entry
                    .fields
                    .iter()
                    .map(|f| f.score(&query, &pattern, self.config.distance))
                    .min_by(|a, b| a.total_cmp(b))
                    .filter(|score| *score <= self.config.threshold)
                    .map(|score| (i, score))
            })
            .collect();

        // Stable: equal scores keep catalog order.
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored
            .into_iter()
            .take(limit)
            .map(|(i, _)| self.catalog[i].clone())
            .collect()
    }
}

/// Score of the best approximate occurrence of `pattern` anywhere in `text`.
fn match_score(pattern: &[char], text: &[char], distance: usize) -> f64 {
    let (errors, offset) = approximate_find(pattern, text);
    let location = if distance == 0 {
        if offset == 0 {
            0.0
        } else {
            1.0
        }
    } else {
        offset as f64 / distance as f64
    };
    errors as f64 / pattern.len() as f64 + location
}

/// Sellers' approximate substring search.
///
/// Returns the minimum edit distance between `pattern` and any substring of
/// `text`, and the start offset of the earliest such substring.
fn approximate_find(pattern: &[char], text: &[char]) -> (usize, usize) {
    let m = pattern.len();
    // (cost, start) per pattern prefix length, for the current text column.
    let mut prev: Vec<(usize, usize)> = (0..=m).map(|i| (i, 0)).collect();
    let mut best = prev[m];

    for (j, &tc) in text.iter().enumerate() {
        let mut cur = Vec::with_capacity(m + 1);
        cur.push((0, j + 1));
        for i in 1..=m {
            let substitution = if pattern[i - 1] == tc { 0 } else { 1 };
            let diagonal = (prev[i - 1].0 + substitution, prev[i - 1].1);
            let skip_text = (prev[i].0 + 1, prev[i].1);
            let skip_pattern = (cur[i - 1].0 + 1, cur[i - 1].1);
            let cell = [diagonal, skip_text, skip_pattern]
                .into_iter()
                .min_by_key(|c| c.0)
                .unwrap_or(diagonal);
            cur.push(cell);
        }
        if cur[m].0 < best.0 {
            best = cur[m];
        }
        prev = cur;
    }

    best
}

/// Holds the index for the current catalog and rebuilds it when the catalog
/// reference changes.
#[derive(Debug)]
pub struct SearchService {
    config: SearchConfig,
    current: RwLock<Option<Arc<InstrumentIndex>>>,
}

impl SearchService {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            config,
            current: RwLock::new(None),
        }
    }

    /// Index for `catalog`, reusing the cached one when it was built from the
    /// same `Arc`.
    pub fn index_for(&self, catalog: &Arc<[Instrument]>) -> Arc<InstrumentIndex> {
        if let Some(index) = self.current.read().as_ref() {
            if Arc::ptr_eq(index.catalog(), catalog) {
                return index.clone();
            }
        }

        let index = Arc::new(InstrumentIndex::build(catalog.clone(), self.config.clone()));
        *self.current.write() = Some(index.clone());
        index
    }

    pub fn search(&self, catalog: &Arc<[Instrument]>, query: &str, limit: usize) -> Vec<Instrument> {
        self.index_for(catalog).search(query, limit)
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }
}
