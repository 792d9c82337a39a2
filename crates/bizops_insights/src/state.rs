use std::sync::Arc;

use tokio::sync::RwLock;

use crate::domains::competitor::CompetitorPriceMap;

/// Session-scoped competitor prices.
///
/// Readers get an immutable snapshot; writers build a new map and swap it in
/// whole, so a reader never observes a half-applied import.
#[derive(Clone, Default)]
pub struct CompetitorPriceStore {
    current: Arc<RwLock<Arc<CompetitorPriceMap>>>,
}

impl CompetitorPriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> Arc<CompetitorPriceMap> {
        self.current.read().await.clone()
    }

    pub async fn replace(&self, prices: CompetitorPriceMap) {
        *self.current.write().await = Arc::new(prices);
    }

    /// Overwrite-merge `incoming` and return the resulting snapshot.
    pub async fn merge(&self, incoming: CompetitorPriceMap) -> Arc<CompetitorPriceMap> {
        let mut guard = self.current.write().await;
        let mut next = CompetitorPriceMap::clone(&guard);
        next.merge(incoming);
        let next = Arc::new(next);
        *guard = next.clone();
        next
    }

    pub async fn clear(&self) {
        self.replace(CompetitorPriceMap::new()).await;
    }
}
