//! Side-effect grants declared by a plugin package

use crate::node_spec::SideEffect;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Set of side-effect classes a plugin is allowed to use
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grants {
    #[serde(default)]
    pub side_effects: BTreeSet<SideEffect>,
}

impl Grants {
    /// No side effects granted
    pub fn none() -> Self {
        Self::default()
    }

    /// Every side effect granted
    pub fn all() -> Self {
        Self {
            side_effects: SideEffect::ALL.into_iter().collect(),
        }
    }

    pub fn with(mut self, effect: SideEffect) -> Self {
        self.side_effects.insert(effect);
        self
    }

    pub fn allows(&self, effect: SideEffect) -> bool {
        self.side_effects.contains(&effect)
    }

    /// Effects in `required` that are not granted
    pub fn missing<'r>(&self, required: impl IntoIterator<Item = &'r SideEffect>) -> Vec<SideEffect> {
        required
            .into_iter()
            .filter(|e| !self.allows(**e))
            .copied()
            .collect()
    }

    /// Stable digest used to detect grant changes across loads
    pub fn compute_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for effect in &self.side_effects {
            hasher.update(effect.as_str().as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize().to_hex().to_string()
    }
}
