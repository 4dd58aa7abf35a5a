// In-memory implementation of RecordStore.
//
// **Why keep an in-memory store?**
// - Lets local runs and tests exercise the full pipeline without a database
// - Still follows the exact same pagination contract as the SQLite store
//
// DashMap gives us a concurrent map that's safe to share across async tasks
// without wrapping everything in a Mutex.

use crate::core::moderation::{ContentRecord, RecordPage, RecordStore, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;

use super::{decode_cursor, encode_cursor};

pub struct InMemoryRecordStore {
    records: DashMap<String, ContentRecord>,
    page_size: usize,
}

impl InMemoryRecordStore {
    #[allow(dead_code)]
    pub fn new(page_size: usize) -> Self {
        Self {
            records: DashMap::new(),
            page_size: page_size.max(1),
        }
    }

    /// Seed a record. Test/local tooling only - the pipeline itself never
    /// writes to the collection.
    #[allow(dead_code)]
    pub fn insert(&self, record: ContentRecord) {
        self.records.insert(record.id.clone(), record);
    }

    /// Snapshot of all ids in sorted order. Pagination walks this ordering
    /// so every record lands in exactly one page per sweep.
    fn sorted_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.records.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    fn page_after(
        &self,
        after_id: Option<String>,
        filter_owner: Option<&str>,
    ) -> RecordPage {
        let ids = self.sorted_ids();
        let mut selected = Vec::new();
        let mut next_token = None;

        for id in ids {
            if let Some(after) = &after_id {
                if id.as_str() <= after.as_str() {
                    continue;
                }
            }
            let record = match self.records.get(&id) {
                Some(entry) => entry.clone(),
                None => continue,
            };
            if let Some(owner) = filter_owner {
                if record.owner != owner {
                    continue;
                }
            }
            if selected.len() == self.page_size {
                // One past the page boundary means there is more to read.
                next_token = selected
                    .last()
                    .map(|r: &ContentRecord| encode_cursor(&r.id));
                break;
            }
            selected.push(record);
        }

        RecordPage {
            records: selected,
            next_token,
        }
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get_by_id(&self, id: &str) -> Result<ContentRecord, StoreError> {
        self.records
            .get(id)
            .map(|entry| entry.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn query_by_owner(
        &self,
        owner: &str,
        token: Option<&str>,
    ) -> Result<RecordPage, StoreError> {
        if owner.is_empty() {
            return Err(StoreError::InvalidQuery("empty owner filter".to_string()));
        }
        let after_id = token.map(decode_cursor).transpose()?;
        Ok(self.page_after(after_id, Some(owner)))
    }

    async fn scan_all(&self, token: Option<&str>) -> Result<RecordPage, StoreError> {
        let after_id = token.map(decode_cursor).transpose()?;
        Ok(self.page_after(after_id, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(id: &str, owner: &str) -> ContentRecord {
        ContentRecord {
            id: id.to_string(),
            content: format!("content of {id}"),
            owner: owner.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn seeded(count: usize, page_size: usize) -> InMemoryRecordStore {
        let store = InMemoryRecordStore::new(page_size);
        for i in 0..count {
            store.insert(record(&format!("rec-{i:02}"), "owner-1"));
        }
        store
    }

    #[tokio::test]
    async fn get_by_id_finds_seeded_records() {
        let store = seeded(3, 10);
        let found = store.get_by_id("rec-01").await.unwrap();
        assert_eq!(found.id, "rec-01");
        assert!(matches!(
            store.get_by_id("ghost").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn scan_visits_every_record_exactly_once() {
        // Pagination boundary falls both on and off the page size.
        for (count, page_size) in [(6, 2), (7, 3), (5, 5), (4, 10)] {
            let store = seeded(count, page_size);
            let mut seen = Vec::new();
            let mut token: Option<String> = None;
            loop {
                let page = store.scan_all(token.as_deref()).await.unwrap();
                seen.extend(page.records.into_iter().map(|r| r.id));
                match page.next_token {
                    Some(next) => token = Some(next),
                    None => break,
                }
            }
            let mut deduped = seen.clone();
            deduped.sort();
            deduped.dedup();
            assert_eq!(deduped.len(), count, "count={count} page_size={page_size}");
        }
    }

    #[tokio::test]
    async fn owner_query_filters_and_paginates() {
        let store = InMemoryRecordStore::new(2);
        store.insert(record("a", "alice"));
        store.insert(record("b", "bob"));
        store.insert(record("c", "alice"));
        store.insert(record("d", "alice"));

        let first = store.query_by_owner("alice", None).await.unwrap();
        assert_eq!(first.records.len(), 2);
        assert!(first.records.iter().all(|r| r.owner == "alice"));

        let token = first.next_token.expect("more pages expected");
        let second = store.query_by_owner("alice", Some(&token)).await.unwrap();
        assert_eq!(second.records.len(), 1);
        assert!(second.next_token.is_none());
    }

    #[tokio::test]
    async fn malformed_token_is_rejected() {
        let store = seeded(2, 2);
        assert!(matches!(
            store.scan_all(Some("%%%")).await,
            Err(StoreError::InvalidQuery(_))
        ));
    }
}
