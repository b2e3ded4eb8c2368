use crate::error::{Result, TaxonomyError};
use crate::path::TaxonomyPath;
use crate::trie::PrefixTree;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// A leaf offered to the model, paired with the top-level category it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Candidate {
    pub leaf: String,
    pub top_level: String,
}

/// Summary counts, logged at build time and reported by the CLI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaxonomyStats {
    pub paths: usize,
    pub leaves: usize,
    pub top_level_categories: usize,
    pub max_depth: usize,
    /// Leaf names that occur under more than one path
    pub duplicate_leaf_names: usize,
}

/// Immutable index over a flat taxonomy file.
///
/// Built once and shared read-only (typically behind an `Arc`).
#[derive(Debug)]
pub struct TaxonomyIndex {
    paths: Vec<TaxonomyPath>,
    leaf_flags: Vec<bool>,
    top_levels: Vec<String>,
    leaves_by_top_level: HashMap<String, Vec<usize>>,
    leaf_lookup: HashMap<String, usize>,
    duplicate_leaf_names: usize,
}

impl TaxonomyIndex {
    /// Read and index a taxonomy file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                TaxonomyError::Missing {
                    path: path.to_path_buf(),
                }
            } else {
                TaxonomyError::Io(err)
            }
        })?;

        log::info!("Building taxonomy index from {}", path.display());
        Self::build(raw.lines())
    }

    /// Index taxonomy lines. The first line is a header and is discarded;
    /// blank lines and lines with an empty segment are skipped; repeated
    /// lines are indexed once.
    pub fn build<I, S>(lines: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut paths = Vec::new();
        let mut tree = PrefixTree::new();

        for (offset, line) in lines.into_iter().enumerate().skip(1) {
            let line = line.as_ref();
            if line.trim().is_empty() {
                continue;
            }

            let Some(path) = TaxonomyPath::parse(line) else {
                log::warn!(
                    "Skipping malformed taxonomy line {}: empty category segment",
                    offset + 1
                );
                continue;
            };

            if let Some(existing) = tree.insert(path.segments(), paths.len()) {
                log::debug!(
                    "Skipping repeated taxonomy line {} (same as path #{existing}): {path}",
                    offset + 1
                );
                continue;
            }
            paths.push(path);
        }

        if paths.is_empty() {
            return Err(TaxonomyError::Empty);
        }

        let leaf_flags = tree.leaf_flags(paths.len());
        let index = Self::assemble(paths, leaf_flags);

        let stats = index.stats();
        log::info!(
            "Built taxonomy index: {} paths, {} leaves, {} top-level categories",
            stats.paths,
            stats.leaves,
            stats.top_level_categories
        );
        if stats.duplicate_leaf_names > 0 {
            log::warn!(
                "{} leaf names occur under more than one path; lookups resolve to the first in file order",
                stats.duplicate_leaf_names
            );
        }

        Ok(index)
    }

    /// Index with no paths. Every lookup comes back empty.
    pub fn empty() -> Self {
        Self::assemble(Vec::new(), Vec::new())
    }

    fn assemble(paths: Vec<TaxonomyPath>, leaf_flags: Vec<bool>) -> Self {
        let mut top_levels: Vec<String> = Vec::new();
        let mut seen_top_levels = HashSet::new();
        let mut leaves_by_top_level: HashMap<String, Vec<usize>> = HashMap::new();
        let mut leaf_lookup: HashMap<String, usize> = HashMap::new();
        let mut duplicate_names = HashSet::new();

        for (idx, path) in paths.iter().enumerate() {
            let top_level = path.top_level();
            if seen_top_levels.insert(top_level.to_string()) {
                top_levels.push(top_level.to_string());
            }

            if !leaf_flags[idx] {
                continue;
            }

            leaves_by_top_level
                .entry(top_level.to_string())
                .or_default()
                .push(idx);

            if leaf_lookup.contains_key(path.leaf()) {
                duplicate_names.insert(path.leaf().to_string());
            } else {
                leaf_lookup.insert(path.leaf().to_string(), idx);
            }
        }

        Self {
            paths,
            leaf_flags,
            top_levels,
            leaves_by_top_level,
            leaf_lookup,
            duplicate_leaf_names: duplicate_names.len(),
        }
    }

    /// All indexed paths in file order
    pub fn paths(&self) -> &[TaxonomyPath] {
        &self.paths
    }

    /// Leaf markers aligned with [`Self::paths`]
    pub fn leaf_flags(&self) -> &[bool] {
        &self.leaf_flags
    }

    pub fn is_leaf(&self, path_index: usize) -> bool {
        self.leaf_flags.get(path_index).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Distinct first segments, in the order they first appear
    pub fn top_level_categories(&self) -> &[String] {
        &self.top_levels
    }

    /// Leaves under `top_level` in file order, skipping names in `excluding`.
    ///
    /// Leaf names are unique within the returned set even if the taxonomy
    /// repeats a name under two branches.
    pub fn leaf_paths_for_l1(&self, top_level: &str, excluding: &HashSet<String>) -> Vec<Candidate> {
        let Some(indices) = self.leaves_by_top_level.get(top_level) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        indices
            .iter()
            .map(|&idx| self.paths[idx].leaf())
            .filter(|leaf| !excluding.contains(*leaf))
            .filter(|leaf| seen.insert(*leaf))
            .map(|leaf| Candidate {
                leaf: leaf.to_string(),
                top_level: top_level.to_string(),
            })
            .collect()
    }

    /// Resolve a leaf name to its full path.
    ///
    /// Matches on exact equality of the final segment: `"Shoes"` never
    /// resolves to `"... > Running Shoes"`.
    pub fn full_path_for_leaf(&self, leaf: &str) -> Option<&TaxonomyPath> {
        self.leaf_lookup.get(leaf).map(|&idx| &self.paths[idx])
    }

    pub fn stats(&self) -> TaxonomyStats {
        TaxonomyStats {
            paths: self.paths.len(),
            leaves: self.leaf_flags.iter().filter(|flag| **flag).count(),
            top_level_categories: self.top_levels.len(),
            max_depth: self.paths.iter().map(TaxonomyPath::depth).max().unwrap_or(0),
            duplicate_leaf_names: self.duplicate_leaf_names,
        }
    }
}
