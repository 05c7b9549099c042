use std::collections::HashMap;

use crate::canvas::Cell;
use crate::util::compare_codes;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorUsage {
    pub code: String,
    pub count: usize,
}

/// Memoized per-code cell counts, keyed on a revision number.
#[derive(Debug, Default)]
pub struct ColorUsageCache {
    revision: Option<u64>,
    usage: Vec<ColorUsage>,
}

impl ColorUsageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the cached list; the next read rescans.
    pub fn invalidate(&mut self) {
        self.revision = None;
    }

    pub fn is_valid_for(&self, revision: u64) -> bool {
        self.revision == Some(revision)
    }

    /// Used codes with counts, in locale-numeric code order.
    pub fn get_used_colors(&mut self, grid: &[Cell], revision: u64) -> &[ColorUsage] {
        if !self.is_valid_for(revision) {
            self.usage = count_codes(grid);
            self.revision = Some(revision);
        }
        &self.usage
    }
}

/// Full rescan of a grid.
pub fn count_codes(grid: &[Cell]) -> Vec<ColorUsage> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for entry in grid.iter().flatten() {
        *counts.entry(entry.code.as_str()).or_insert(0) += 1;
    }
    let mut usage: Vec<ColorUsage> = counts
        .into_iter()
        .map(|(code, count)| ColorUsage { code: code.to_string(), count })
        .collect();
    usage.sort_by(|a, b| compare_codes(&a.code, &b.code));
    usage
}
