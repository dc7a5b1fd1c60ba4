use chrono::{DateTime, Utc};
use docseal_audit::DocumentId;
use docseal_digest::Digest;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an anchor reference
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorId(pub String);

impl AnchorId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Response of the anchoring service to a submission
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorReceipt {
    pub tx_ref: String,
    pub network: String,
}

/// Response of the anchoring service to a resolution query
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub confirmed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_ref: Option<String>,
}

impl Resolution {
    pub fn pending() -> Self {
        Self {
            confirmed: false,
            block_ref: None,
        }
    }

    pub fn confirmed(block_ref: impl Into<String>) -> Self {
        Self {
            confirmed: true,
            block_ref: Some(block_ref.into()),
        }
    }
}

/// A ledger head submitted to the external ledger.
///
/// Identity, digest and sequence never change after creation; only the
/// confirmation fields are updated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorReference {
    pub anchor_id: AnchorId,
    pub document_id: DocumentId,
    /// Head record digest at submission time
    pub anchored_digest: Digest,
    /// Sequence of that head record
    pub anchored_sequence: u64,
    pub external_tx_ref: String,
    pub network: String,
    pub anchored_at: DateTime<Utc>,
    pub confirmed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl AnchorReference {
    pub fn new(
        document_id: DocumentId,
        anchored_digest: Digest,
        anchored_sequence: u64,
        receipt: AnchorReceipt,
    ) -> Self {
        Self {
            anchor_id: AnchorId::generate(),
            document_id,
            anchored_digest,
            anchored_sequence,
            external_tx_ref: receipt.tx_ref,
            network: receipt.network,
            anchored_at: Utc::now(),
            confirmed: false,
            block_ref: None,
            confirmed_at: None,
        }
    }
}
