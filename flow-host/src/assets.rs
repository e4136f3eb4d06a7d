//! Immutable package asset table

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Package-relative path to binary content, fixed at engine construction
#[derive(Clone, Default)]
pub struct AssetTable {
    entries: HashMap<String, Arc<[u8]>>,
}

impl AssetTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset(mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.entries
            .insert(normalize(&path.into()), Arc::from(bytes.into()));
        self
    }

    /// Look up an asset; a leading `/` or `./` is ignored
    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.entries.get(normalize(path).as_str()).map(|b| &b[..])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Vec<u8>)> for AssetTable {
    fn from_iter<I: IntoIterator<Item = (String, Vec<u8>)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |table, (path, bytes)| table.with_asset(path, bytes))
    }
}

fn normalize(path: &str) -> String {
    path.trim_start_matches("./").trim_start_matches('/').to_string()
}

impl fmt::Debug for AssetTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetTable")
            .field("count", &self.entries.len())
            .finish()
    }
}
