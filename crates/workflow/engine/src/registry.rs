//! Document registry: the source of a document's current content digest
//!
//! The engine only reads from the registry. Content storage itself lives
//! outside the workflow layer; [`InMemoryDocumentRegistry`] stands in for it.

use async_trait::async_trait;
use dashmap::DashMap;
use docseal_digest::digest_content;
use workflow_types::{DocumentId, DocumentVersion};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Document not registered: {0}")]
    NotFound(DocumentId),

    #[error("Registry backend error: {0}")]
    Backend(String),
}

/// Read access to document content digests
#[async_trait]
pub trait DocumentRegistry: Send + Sync {
    /// Current digest and version of a document's content
    async fn content_digest(&self, document: &DocumentId) -> Result<DocumentVersion, RegistryError>;
}

/// In-memory registry
#[derive(Debug, Default)]
pub struct InMemoryDocumentRegistry {
    documents: DashMap<DocumentId, DocumentVersion>,
}

impl InMemoryDocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store new content for a document.
    ///
    /// The version starts at 1 and increments only when the digest changes.
    pub fn put(&self, document: DocumentId, content: &[u8]) -> DocumentVersion {
        let digest = digest_content(content);
        let mut entry = self
            .documents
            .entry(document.clone())
            .or_insert_with(|| DocumentVersion::new(document.clone(), digest, 0));

        if entry.version == 0 || entry.content_digest != digest {
            entry.content_digest = digest;
            entry.version += 1;
            tracing::debug!(
                document = %document,
                version = entry.version,
                digest = %digest.short(),
                "Document content updated"
            );
        }
        entry.clone()
    }

    pub fn get(&self, document: &DocumentId) -> Option<DocumentVersion> {
        self.documents.get(document).map(|d| d.clone())
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl DocumentRegistry for InMemoryDocumentRegistry {
    async fn content_digest(&self, document: &DocumentId) -> Result<DocumentVersion, RegistryError> {
        self.get(document)
            .ok_or_else(|| RegistryError::NotFound(document.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn version_bumps_only_on_change() {
        let registry = InMemoryDocumentRegistry::new();
        let doc = DocumentId::new("lease");

        let v1 = registry.put(doc.clone(), b"draft one");
        assert_eq!(v1.version, 1);
        assert_eq!(v1.content_digest, digest_content(b"draft one"));

        let same = registry.put(doc.clone(), b"draft one");
        assert_eq!(same.version, 1);

        let v2 = registry.put(doc.clone(), b"draft two");
        assert_eq!(v2.version, 2);

        let read = registry.content_digest(&doc).await.unwrap();
        assert_eq!(read, v2);
    }

    #[tokio::test]
    async fn unknown_document_is_not_found() {
        let registry = InMemoryDocumentRegistry::new();
        let err = registry
            .content_digest(&DocumentId::new("missing"))
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::NotFound(DocumentId::new("missing")));
    }
}
