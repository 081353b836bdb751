use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};

/// Ignore-pattern set applied on the ingestion path: matching events are
/// dropped before they reach the pending map.
#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    set: GlobSet,
}

impl IgnoreFilter {
    /// Compiles the pattern list; invalid patterns are skipped individually.
    pub fn new(patterns: &[String]) -> Self {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            if let Ok(glob) = Glob::new(pattern) {
                builder.add(glob);
            }
        }
        Self {
            set: builder.build().unwrap_or_else(|_| GlobSet::empty()),
        }
    }

    pub fn is_ignored<P: AsRef<Path>>(&self, path: P) -> bool {
        self.set.is_match(path.as_ref())
    }
}
