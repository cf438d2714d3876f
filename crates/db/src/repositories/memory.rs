use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use optiquote_core::domain::quote::{Quote, QuoteId, QuoteStatus};
use optiquote_core::flows::AppliedTransition;

use super::{
    transitioned, warning_marked, QuoteRepository, RepositoryError, StatusHistoryEntry,
};

#[derive(Default)]
struct Store {
    quotes: HashMap<String, Quote>,
    history: Vec<StatusHistoryEntry>,
}

#[derive(Default)]
pub struct InMemoryQuoteRepository {
    store: RwLock<Store>,
}

impl InMemoryQuoteRepository {
    fn check_version(store: &Store, snapshot: &Quote) -> Result<(), RepositoryError> {
        match store.quotes.get(&snapshot.id.0) {
            None => Err(RepositoryError::NotFound(snapshot.id.0.clone())),
            Some(current) if current.version != snapshot.version => {
                Err(RepositoryError::VersionConflict {
                    quote_id: snapshot.id.0.clone(),
                    expected_version: snapshot.version,
                })
            }
            Some(_) => Ok(()),
        }
    }

    /// Test hook: overwrite the stored row as another writer would.
    pub async fn replace(&self, quote: Quote) {
        let mut store = self.store.write().await;
        store.quotes.insert(quote.id.0.clone(), quote);
    }
}

#[async_trait::async_trait]
impl QuoteRepository for InMemoryQuoteRepository {
    async fn find_by_id(&self, id: &QuoteId) -> Result<Option<Quote>, RepositoryError> {
        let store = self.store.read().await;
        Ok(store.quotes.get(&id.0).cloned())
    }

    async fn insert(&self, quote: &Quote) -> Result<(), RepositoryError> {
        let mut store = self.store.write().await;
        if store.quotes.contains_key(&quote.id.0) {
            return Err(RepositoryError::AlreadyExists(quote.id.0.clone()));
        }
        store.quotes.insert(quote.id.0.clone(), quote.clone());
        Ok(())
    }

    async fn apply_transition(
        &self,
        snapshot: &Quote,
        applied: &AppliedTransition,
    ) -> Result<Quote, RepositoryError> {
        let mut store = self.store.write().await;
        Self::check_version(&store, snapshot)?;

        let next = transitioned(snapshot, applied);
        store.history.push(StatusHistoryEntry::from_applied(&snapshot.id, applied, next.version));
        store.quotes.insert(next.id.0.clone(), next.clone());
        Ok(next)
    }

    async fn mark_expiration_warning_sent(
        &self,
        snapshot: &Quote,
        sent_at: DateTime<Utc>,
    ) -> Result<Quote, RepositoryError> {
        let mut store = self.store.write().await;
        Self::check_version(&store, snapshot)?;

        let next = warning_marked(snapshot, sent_at);
        store.quotes.insert(next.id.0.clone(), next.clone());
        Ok(next)
    }

    async fn list_by_statuses(
        &self,
        statuses: &[QuoteStatus],
    ) -> Result<Vec<Quote>, RepositoryError> {
        let store = self.store.read().await;
        let mut quotes: Vec<Quote> = store
            .quotes
            .values()
            .filter(|quote| statuses.contains(&quote.status))
            .cloned()
            .collect();
        quotes.sort_by(|a, b| {
            a.last_activity_at.cmp(&b.last_activity_at).then_with(|| a.id.0.cmp(&b.id.0))
        });
        Ok(quotes)
    }

    async fn status_history(
        &self,
        id: &QuoteId,
    ) -> Result<Vec<StatusHistoryEntry>, RepositoryError> {
        let store = self.store.read().await;
        Ok(store.history.iter().filter(|entry| entry.quote_id == *id).cloned().collect())
    }
}
