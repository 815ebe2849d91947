//! Persisted strategy weights.
//!
//! A flat JSON mapping of model_id -> weight. Loading repairs degenerate
//! files (zero sum, missing entries) by resetting to an equal share;
//! saving renormalizes so the stored sum is exactly 1.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::Result;

pub struct WeightStore {
    path: PathBuf,
}

impl WeightStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The same mapping scoped to one symbol: `weights.json` becomes
    /// `weights-BTCUSDT.json`. Multi-symbol engines keep one file per
    /// symbol instead of overwriting a shared one.
    pub fn for_symbol(&self, symbol: &str) -> WeightStore {
        let mut name = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("weights")
            .to_string();
        name.push('-');
        name.push_str(symbol);
        if let Some(ext) = self.path.extension().and_then(|e| e.to_str()) {
            name.push('.');
            name.push_str(ext);
        }
        WeightStore::new(self.path.with_file_name(name))
    }

    /// Load weights for the expected model ids.
    ///
    /// Resets to an equal share when the file is missing or unreadable,
    /// when any expected id is absent, or when the stored sum is not
    /// positive.
    pub fn load(&self, expected_ids: &[&str]) -> BTreeMap<String, f64> {
        let stored: Option<BTreeMap<String, f64>> = std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok());

        match stored {
            Some(weights) if usable(&weights, expected_ids) => normalize(weights),
            Some(_) => {
                warn!(path = %self.path.display(), "strategy weights degenerate, resetting to equal share");
                equal_share(expected_ids)
            }
            None => equal_share(expected_ids),
        }
    }

    /// Persist weights, renormalized so they sum to exactly 1.
    pub fn save(&self, weights: &BTreeMap<String, f64>) -> Result<()> {
        let normalized = normalize(weights.clone());
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&normalized)?)?;
        Ok(())
    }
}

fn usable(weights: &BTreeMap<String, f64>, expected_ids: &[&str]) -> bool {
    let sum: f64 = weights.values().sum();
    sum > 0.0
        && sum.is_finite()
        && expected_ids.iter().all(|id| weights.contains_key(*id))
        && weights.values().all(|w| w.is_finite() && *w >= 0.0)
}

fn normalize(weights: BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    let sum: f64 = weights.values().sum();
    if sum <= 0.0 || !sum.is_finite() {
        return weights;
    }
    weights.into_iter().map(|(k, v)| (k, v / sum)).collect()
}

fn equal_share(expected_ids: &[&str]) -> BTreeMap<String, f64> {
    let share = 1.0 / expected_ids.len().max(1) as f64;
    expected_ids
        .iter()
        .map(|id| (id.to_string(), share))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const IDS: [&str; 3] = ["short_memory", "gated_memory", "attention"];

    fn temp_store() -> WeightStore {
        let path = std::env::temp_dir().join(format!("quantbot-weights-{}.json", Uuid::new_v4()));
        WeightStore::new(path)
    }

    #[test]
    fn missing_file_yields_equal_share() {
        let store = temp_store();
        let weights = store.load(&IDS);
        assert_eq!(weights.len(), 3);
        for w in weights.values() {
            assert!((w - 1.0 / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn save_then_load_roundtrips_normalized() {
        let store = temp_store();
        let mut raw = BTreeMap::new();
        raw.insert("short_memory".to_string(), 2.0);
        raw.insert("gated_memory".to_string(), 1.0);
        raw.insert("attention".to_string(), 1.0);
        store.save(&raw).unwrap();

        let loaded = store.load(&IDS);
        let sum: f64 = loaded.values().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!((loaded["short_memory"] - 0.5).abs() < 1e-9);

        std::fs::remove_file(store.path()).ok();
    }

    #[test]
    fn symbol_scoped_stores_use_distinct_files() {
        let base = WeightStore::new("data/strategy_weights.json");
        let btc = base.for_symbol("BTCUSDT");
        let eth = base.for_symbol("ETHUSDT");
        assert_eq!(btc.path(), Path::new("data/strategy_weights-BTCUSDT.json"));
        assert_eq!(eth.path(), Path::new("data/strategy_weights-ETHUSDT.json"));
        assert_ne!(btc.path(), eth.path());
    }

    #[test]
    fn zero_sum_file_resets_to_equal_share() {
        let store = temp_store();
        let mut raw = BTreeMap::new();
        for id in IDS {
            raw.insert(id.to_string(), 0.0);
        }
        std::fs::write(store.path(), serde_json::to_string(&raw).unwrap()).unwrap();

        let loaded = store.load(&IDS);
        let sum: f64 = loaded.values().sum();
        assert!((sum - 1.0).abs() < 1e-12);

        std::fs::remove_file(store.path()).ok();
    }

    #[test]
    fn missing_entry_resets_to_equal_share() {
        let store = temp_store();
        let mut raw = BTreeMap::new();
        raw.insert("short_memory".to_string(), 1.0);
        std::fs::write(store.path(), serde_json::to_string(&raw).unwrap()).unwrap();

        let loaded = store.load(&IDS);
        assert_eq!(loaded.len(), 3);
        assert!((loaded["attention"] - 1.0 / 3.0).abs() < 1e-12);

        std::fs::remove_file(store.path()).ok();
    }
}
