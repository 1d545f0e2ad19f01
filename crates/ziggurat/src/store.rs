//! Narrow interfaces to the persistence collaborator.
//!
//! The bot only ever talks to storage through these three traits; what
//! sits behind them (a database, a cache, the in-memory store below) is
//! not its concern. Game configuration is lazily defaulted per channel on
//! first sight, and the outcome log is append-only.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;

/// A named difficulty curve: linear thresholds for the up and down rolls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PyramidProfile {
    pub up_base: f64,
    pub up_slope: f64,
    pub down_base: f64,
    pub down_slope: f64,
}

/// Per-channel game settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    pub active: bool,
    pub profile: String,
    pub facts: Vec<String>,
}

/// One appended, never-mutated scored event.
#[derive(Debug, Clone, PartialEq)]
pub struct GameRecord {
    pub channel: String,
    pub user: String,
    pub success: bool,
    pub peak: u32,
    pub token: String,
    /// Who broke it, for losses.
    pub destroyer: Option<String>,
}

/// Failures from the persistence collaborator.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Source of the named difficulty profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn profiles(&self) -> Result<HashMap<String, PyramidProfile>, StoreError>;
}

/// Per-channel game configuration, lazily defaulted.
#[async_trait]
pub trait GameStore: Send + Sync {
    async fn load(&self, channel: &str) -> Result<GameConfig, StoreError>;
    async fn save(&self, channel: &str, config: &GameConfig) -> Result<(), StoreError>;
}

/// The append-only outcome log.
#[async_trait]
pub trait OutcomeLog: Send + Sync {
    async fn append(&self, record: GameRecord) -> Result<(), StoreError>;

    /// The most recent records for a channel, oldest first.
    async fn recent(&self, channel: &str, limit: usize)
        -> Result<Vec<GameRecord>, StoreError>;
}

// =============================================================================
// In-memory store
// =============================================================================

/// An in-memory implementation of all three storage interfaces, used by
/// the console harness and the tests.
pub struct MemoryStore {
    template: GameConfig,
    profiles: RwLock<HashMap<String, PyramidProfile>>,
    configs: Mutex<HashMap<String, GameConfig>>,
    records: Mutex<Vec<GameRecord>>,
}

impl MemoryStore {
    /// `template` seeds the configuration of channels seen for the first
    /// time.
    pub fn new(
        template: GameConfig,
        profiles: HashMap<String, PyramidProfile>,
    ) -> Arc<Self> {
        Arc::new(Self {
            template,
            profiles: RwLock::new(profiles),
            configs: Mutex::new(HashMap::new()),
            records: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn profiles(&self) -> Result<HashMap<String, PyramidProfile>, StoreError> {
        Ok(self.profiles.read().clone())
    }
}

#[async_trait]
impl GameStore for MemoryStore {
    async fn load(&self, channel: &str) -> Result<GameConfig, StoreError> {
        Ok(self
            .configs
            .lock()
            .entry(channel.to_string())
            .or_insert_with(|| self.template.clone())
            .clone())
    }

    async fn save(&self, channel: &str, config: &GameConfig) -> Result<(), StoreError> {
        self.configs
            .lock()
            .insert(channel.to_string(), config.clone());
        Ok(())
    }
}

#[async_trait]
impl OutcomeLog for MemoryStore {
    async fn append(&self, record: GameRecord) -> Result<(), StoreError> {
        self.records.lock().push(record);
        Ok(())
    }

    async fn recent(
        &self,
        channel: &str,
        limit: usize,
    ) -> Result<Vec<GameRecord>, StoreError> {
        let records = self.records.lock();
        let matching: Vec<GameRecord> = records
            .iter()
            .filter(|r| r.channel == channel)
            .cloned()
            .collect();
        let skip = matching.len().saturating_sub(limit);
        Ok(matching.into_iter().skip(skip).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> GameConfig {
        GameConfig {
            active: false,
            profile: "kind".to_string(),
            facts: vec!["a fact".to_string()],
        }
    }

    #[tokio::test]
    async fn first_load_seeds_the_template() {
        let store = MemoryStore::new(template(), HashMap::new());
        let config = store.load("somewhere").await.unwrap();
        assert_eq!(config, template());

        let mut enabled = config;
        enabled.active = true;
        store.save("somewhere", &enabled).await.unwrap();
        assert!(store.load("somewhere").await.unwrap().active);
        // Other channels still get the template.
        assert!(!store.load("elsewhere").await.unwrap().active);
    }

    #[tokio::test]
    async fn recent_returns_newest_per_channel_oldest_first() {
        let store = MemoryStore::new(template(), HashMap::new());
        for peak in 3..=6 {
            store
                .append(GameRecord {
                    channel: "a".to_string(),
                    user: "u".to_string(),
                    success: true,
                    peak,
                    token: "go".to_string(),
                    destroyer: None,
                })
                .await
                .unwrap();
        }
        store
            .append(GameRecord {
                channel: "b".to_string(),
                user: "u".to_string(),
                success: false,
                peak: 4,
                token: "hm".to_string(),
                destroyer: Some("x".to_string()),
            })
            .await
            .unwrap();

        let recent = store.recent("a", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].peak, 5);
        assert_eq!(recent[1].peak, 6);
    }
}
