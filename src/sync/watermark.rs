//! Watermark Store: the single "synced through" timestamp.

use chrono::{DateTime, Utc};

use super::SyncError;
use crate::db::{advance_watermark, get_watermark, set_watermark, SettingsContext};

/// Reads and writes the committed watermark through the settings context.
///
/// Only the completion handler advances it after initialization; it does
/// so inside its own transaction, not through this type.
#[derive(Clone)]
pub struct WatermarkStore {
    ctx: SettingsContext,
}

impl WatermarkStore {
    pub fn new(ctx: SettingsContext) -> Self {
        Self { ctx }
    }

    /// `None` means sync was never initialized (or was reset). A store
    /// failure reads as `None`: nothing is fetched, nothing is lost.
    pub async fn get(&self) -> Option<DateTime<Utc>> {
        match self.ctx.call(|conn| get_watermark(conn)).await {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read watermark");
                None
            }
        }
    }

    /// Durable before return. `None` clears initialization.
    pub async fn set(&self, value: Option<DateTime<Utc>>) -> Result<(), SyncError> {
        self.ctx
            .call(move |conn| set_watermark(conn, value.as_ref()))
            .await?;
        tracing::info!(watermark = ?value, "Watermark set");
        Ok(())
    }

    /// Compare-and-set max. Returns whether the stored value moved; an
    /// absent watermark stays absent.
    pub async fn advance_to(&self, candidate: DateTime<Utc>) -> Result<bool, SyncError> {
        let moved = self
            .ctx
            .call(move |conn| advance_watermark(conn, &candidate))
            .await?;
        Ok(moved.is_some())
    }

    /// Set the watermark only when none is stored. Returns the value in
    /// effect afterwards.
    pub async fn initialize(&self, start: DateTime<Utc>) -> Result<DateTime<Utc>, SyncError> {
        let value = self
            .ctx
            .call(move |conn| {
                let tx = conn.transaction()?;
                let current = get_watermark(&tx)?;
                let value = match current {
                    Some(existing) => existing,
                    None => {
                        set_watermark(&tx, Some(&start))?;
                        start
                    }
                };
                tx.commit()?;
                Ok(value)
            })
            .await?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::memory::fixtures::at;

    fn store() -> WatermarkStore {
        WatermarkStore::new(SettingsContext::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn absent_until_set() {
        let store = store();
        assert_eq!(store.get().await, None);
        store.set(Some(at(2024, 1, 1))).await.unwrap();
        assert_eq!(store.get().await, Some(at(2024, 1, 1)));
    }

    #[tokio::test]
    async fn set_none_resets() {
        let store = store();
        store.set(Some(at(2024, 1, 1))).await.unwrap();
        store.set(None).await.unwrap();
        assert_eq!(store.get().await, None);
    }

    #[tokio::test]
    async fn initialize_keeps_existing_value() {
        let store = store();
        assert_eq!(store.initialize(at(2024, 1, 1)).await.unwrap(), at(2024, 1, 1));
        assert_eq!(store.initialize(at(2023, 6, 1)).await.unwrap(), at(2024, 1, 1));
        assert_eq!(store.get().await, Some(at(2024, 1, 1)));
    }

    #[tokio::test]
    async fn advance_to_never_moves_back() {
        let store = store();
        assert!(!store.advance_to(at(2024, 2, 1)).await.unwrap());
        assert_eq!(store.get().await, None);

        store.set(Some(at(2024, 1, 1))).await.unwrap();
        assert!(store.advance_to(at(2024, 2, 1)).await.unwrap());
        assert!(!store.advance_to(at(2024, 1, 15)).await.unwrap());
        assert!(!store.advance_to(at(2024, 2, 1)).await.unwrap());
        assert_eq!(store.get().await, Some(at(2024, 2, 1)));
    }

    #[tokio::test]
    async fn clones_share_state() {
        let a = store();
        let b = a.clone();
        a.set(Some(at(2024, 3, 1))).await.unwrap();
        assert_eq!(b.get().await, Some(at(2024, 3, 1)));
    }
}
