//! Storage for anchor references.

use crate::{AnchorError, AnchorId, AnchorReference, AnchorResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use docseal_audit::DocumentId;

/// Persistence for [`AnchorReference`]s.
///
/// References are never deleted. The only update is [`mark_confirmed`],
/// which leaves identity and anchored digest untouched.
///
/// [`mark_confirmed`]: AnchorStore::mark_confirmed
#[async_trait]
pub trait AnchorStore: Send + Sync {
    async fn insert(&self, reference: AnchorReference) -> AnchorResult<()>;

    async fn get(&self, anchor_id: &AnchorId) -> AnchorResult<Option<AnchorReference>>;

    /// All references of a document, oldest first
    async fn list(&self, document: &DocumentId) -> AnchorResult<Vec<AnchorReference>>;

    /// Unconfirmed references across all documents
    async fn unconfirmed(&self) -> AnchorResult<Vec<AnchorReference>>;

    async fn mark_confirmed(
        &self,
        anchor_id: &AnchorId,
        block_ref: Option<String>,
        confirmed_at: DateTime<Utc>,
    ) -> AnchorResult<AnchorReference>;

    /// Most recently submitted confirmed reference of a document
    async fn latest_confirmed(&self, document: &DocumentId) -> AnchorResult<Option<AnchorReference>> {
        Ok(self
            .list(document)
            .await?
            .into_iter()
            .rfind(|r| r.confirmed))
    }
}

/// In-memory anchor store
#[derive(Debug, Default)]
pub struct InMemoryAnchorStore {
    by_document: DashMap<DocumentId, Vec<AnchorReference>>,
    index: DashMap<AnchorId, DocumentId>,
}

impl InMemoryAnchorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AnchorStore for InMemoryAnchorStore {
    async fn insert(&self, reference: AnchorReference) -> AnchorResult<()> {
        if self.index.contains_key(&reference.anchor_id) {
            return Err(AnchorError::Store(format!(
                "duplicate anchor id {}",
                reference.anchor_id
            )));
        }
        self.index
            .insert(reference.anchor_id.clone(), reference.document_id.clone());
        self.by_document
            .entry(reference.document_id.clone())
            .or_default()
            .push(reference);
        Ok(())
    }

    async fn get(&self, anchor_id: &AnchorId) -> AnchorResult<Option<AnchorReference>> {
        let Some(document) = self.index.get(anchor_id).map(|d| d.clone()) else {
            return Ok(None);
        };
        Ok(self.by_document.get(&document).and_then(|refs| {
            refs.iter()
                .find(|r| &r.anchor_id == anchor_id)
                .cloned()
        }))
    }

    async fn list(&self, document: &DocumentId) -> AnchorResult<Vec<AnchorReference>> {
        Ok(self
            .by_document
            .get(document)
            .map(|refs| refs.clone())
            .unwrap_or_default())
    }

    async fn unconfirmed(&self) -> AnchorResult<Vec<AnchorReference>> {
        Ok(self
            .by_document
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|r| !r.confirmed)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect())
    }

    async fn mark_confirmed(
        &self,
        anchor_id: &AnchorId,
        block_ref: Option<String>,
        confirmed_at: DateTime<Utc>,
    ) -> AnchorResult<AnchorReference> {
        let document = self
            .index
            .get(anchor_id)
            .map(|d| d.clone())
            .ok_or_else(|| AnchorError::AnchorNotFound(anchor_id.clone()))?;

        let mut refs = self
            .by_document
            .get_mut(&document)
            .ok_or_else(|| AnchorError::AnchorNotFound(anchor_id.clone()))?;
        let reference = refs
            .iter_mut()
            .find(|r| &r.anchor_id == anchor_id)
            .ok_or_else(|| AnchorError::AnchorNotFound(anchor_id.clone()))?;

        if !reference.confirmed {
            reference.confirmed = true;
            reference.block_ref = block_ref;
            reference.confirmed_at = Some(confirmed_at);
        }
        Ok(reference.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AnchorReceipt;
    use docseal_digest::digest_content;

    fn reference(doc: &str, seq: u64) -> AnchorReference {
        AnchorReference::new(
            DocumentId::new(doc),
            digest_content(format!("{doc}-{seq}").as_bytes()),
            seq,
            AnchorReceipt {
                tx_ref: format!("0x{doc}{seq}"),
                network: "test".into(),
            },
        )
    }

    #[tokio::test]
    async fn confirmation_updates_in_place() {
        let store = InMemoryAnchorStore::new();
        let r = reference("d", 3);
        store.insert(r.clone()).await.unwrap();
        assert_eq!(store.unconfirmed().await.unwrap().len(), 1);
        assert!(store.latest_confirmed(&r.document_id).await.unwrap().is_none());

        let confirmed = store
            .mark_confirmed(&r.anchor_id, Some("block-9".into()), Utc::now())
            .await
            .unwrap();
        assert!(confirmed.confirmed);
        assert_eq!(confirmed.anchor_id, r.anchor_id);
        assert_eq!(confirmed.anchored_digest, r.anchored_digest);
        assert!(store.unconfirmed().await.unwrap().is_empty());
        assert_eq!(
            store.latest_confirmed(&r.document_id).await.unwrap(),
            Some(confirmed)
        );
    }

    #[tokio::test]
    async fn latest_confirmed_prefers_newest() {
        let store = InMemoryAnchorStore::new();
        let older = reference("d", 1);
        let newer = reference("d", 4);
        store.insert(older.clone()).await.unwrap();
        store.insert(newer.clone()).await.unwrap();
        store.mark_confirmed(&older.anchor_id, None, Utc::now()).await.unwrap();
        store.mark_confirmed(&newer.anchor_id, None, Utc::now()).await.unwrap();

        let latest = store
            .latest_confirmed(&DocumentId::new("d"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.anchored_sequence, 4);
    }

    #[tokio::test]
    async fn unknown_anchor_cannot_be_confirmed() {
        let store = InMemoryAnchorStore::new();
        let err = store
            .mark_confirmed(&AnchorId::new("nope"), None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AnchorError::AnchorNotFound(_)));
    }
}
