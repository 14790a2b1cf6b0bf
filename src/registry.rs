//! コレクターの登録と検索

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::collector::Collector;
use crate::config::CollectorState;
use crate::error::CollectorError;

#[derive(Debug, Default, Clone)]
pub struct CollectorRegistry {
    collectors: BTreeMap<String, Arc<Collector>>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 設定IDで登録する。同じIDは登録できない
    pub fn register(&mut self, collector: Collector) -> Result<Arc<Collector>, CollectorError> {
        let id = collector.config().id.clone();
        if self.collectors.contains_key(&id) {
            return Err(CollectorError::DuplicateCollector(id));
        }
        debug!("Registered collector {}", id);
        let collector = Arc::new(collector);
        self.collectors.insert(id, collector.clone());
        Ok(collector)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Collector>> {
        self.collectors.get(id).cloned()
    }

    /// ID順
    pub fn list(&self) -> Vec<Arc<Collector>> {
        self.collectors.values().cloned().collect()
    }

    /// 公開中のコレクターのみ
    pub fn active(&self) -> Vec<Arc<Collector>> {
        self.collectors
            .values()
            .filter(|c| c.config().state == CollectorState::Active)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollectorConfig;

    fn sketch(id: &str, state: CollectorState) -> Collector {
        Collector::sketch(
            CollectorConfig::new(id, id.to_uppercase(), "1", "https://example.com").with_state(state),
        )
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = CollectorRegistry::new();
        registry
            .register(sketch("free", CollectorState::Active))
            .unwrap();
        registry
            .register(sketch("amazon", CollectorState::Active))
            .unwrap();
        registry
            .register(sketch("decathlon", CollectorState::Development))
            .unwrap();

        assert_eq!(registry.len(), 3);
        assert!(registry.get("amazon").is_some());
        assert!(registry.get("missing").is_none());

        let ids: Vec<String> = registry.list().iter().map(|c| c.config().id.clone()).collect();
        assert_eq!(ids, vec!["amazon", "decathlon", "free"]);

        let active: Vec<String> = registry
            .active()
            .iter()
            .map(|c| c.config().id.clone())
            .collect();
        assert_eq!(active, vec!["amazon", "free"]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = CollectorRegistry::new();
        registry
            .register(sketch("amazon", CollectorState::Active))
            .unwrap();
        let err = registry
            .register(sketch("amazon", CollectorState::Development))
            .unwrap_err();
        assert!(matches!(err, CollectorError::DuplicateCollector(id) if id == "amazon"));
    }
}
