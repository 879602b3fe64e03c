use serde::{Deserialize, Serialize};

/// Opaque record produced by a collector.
pub type Record = serde_json::Value;

/// Bounded, ordered group of records sent in one ingest upload.
pub type Batch = Vec<Record>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestMeta {
    /// Source type the records were collected from.
    #[serde(rename = "type")]
    pub kind: String,
}

/// Wire unit of `POST /api/v2/ingest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestEnvelope {
    pub meta: IngestMeta,
    pub data: Batch,
}

impl IngestEnvelope {
    pub fn new(kind: impl Into<String>, data: Batch) -> Self {
        Self {
            meta: IngestMeta { kind: kind.into() },
            data,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
