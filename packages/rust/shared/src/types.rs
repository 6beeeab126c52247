//! Core domain types for rowpipe records and batches.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, RowpipeError};

/// Version tag stamped on every record produced by the current enrichment rules.
pub const PROCESSOR_VERSION: &str = "1.0";

/// One decoded row: header name → raw string value.
pub type RawRow = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// RejectReason
// ---------------------------------------------------------------------------

/// Why a row or payload was refused by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// No usable id or name field.
    MissingIdentity,
    /// The payload could not be read as a key-value structure at all.
    MalformedPayload,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingIdentity => "missing_identity",
            Self::MalformedPayload => "malformed_payload",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Source (provenance)
// ---------------------------------------------------------------------------

/// Where a record came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "source_detail", rename_all = "lowercase")]
pub enum Source {
    /// Batch file ingestion; carries the source object key.
    File(String),
    /// Direct API creation; carries the caller IP or source identifier.
    Api(String),
}

impl Source {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Api(_) => "api",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Self::File(key) => key,
            Self::Api(caller) => caller,
        }
    }

    /// Rebuild a source from its stored `(kind, detail)` columns.
    pub fn from_parts(kind: &str, detail: String) -> Result<Self> {
        match kind {
            "file" => Ok(Self::File(detail)),
            "api" => Ok(Self::Api(detail)),
            other => Err(RowpipeError::validation(format!(
                "unknown record source '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// CanonicalRecord
// ---------------------------------------------------------------------------

/// The persisted unit, keyed by `(id, timestamp)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Partition identity.
    pub id: String,
    /// Sort identity, milliseconds since epoch.
    pub timestamp: i64,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub stock: u64,
    /// Provenance, flattened into `source` + `source_detail`.
    #[serde(flatten)]
    pub source: Source,
    /// When enrichment produced this record.
    pub processed_at: DateTime<Utc>,
    /// Enrichment rules version, see [`PROCESSOR_VERSION`].
    pub processor_version: String,
    /// Set only by tooling updates; the pipeline never writes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CanonicalRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey {
            id: self.id.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// Compound store key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub id: String,
    pub timestamp: i64,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.timestamp)
    }
}

// ---------------------------------------------------------------------------
// RecordPatch
// ---------------------------------------------------------------------------

/// Typed partial update for tooling. Only the mutable business fields exist here;
/// key and provenance fields cannot be patched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<u64>,
}

const IMMUTABLE_FIELDS: &[&str] = &[
    "id",
    "timestamp",
    "source",
    "source_detail",
    "processed_at",
    "processor_version",
    "updated_at",
];

impl RecordPatch {
    /// Build a patch from `field = value` pairs, validating every value against
    /// the record schema. Unknown and immutable fields are rejected.
    pub fn parse<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut patch = Self::default();
        for (field, value) in pairs {
            let field = field.as_ref().trim();
            let value = value.as_ref().trim();
            match field {
                "name" => {
                    if value.is_empty() {
                        return Err(RowpipeError::validation("name cannot be empty"));
                    }
                    patch.name = Some(value.to_string());
                }
                "category" => {
                    if value.is_empty() {
                        return Err(RowpipeError::validation("category cannot be empty"));
                    }
                    patch.category = Some(value.to_string());
                }
                "price" => {
                    let price: f64 = value.parse().map_err(|_| {
                        RowpipeError::validation(format!("price '{value}' is not a number"))
                    })?;
                    if !price.is_finite() || price < 0.0 {
                        return Err(RowpipeError::validation(format!(
                            "price must be a non-negative number, got {value}"
                        )));
                    }
                    patch.price = Some(price);
                }
                "stock" => {
                    let stock: u64 = value.parse().map_err(|_| {
                        RowpipeError::validation(format!(
                            "stock '{value}' is not a non-negative integer"
                        ))
                    })?;
                    patch.stock = Some(stock);
                }
                f if IMMUTABLE_FIELDS.contains(&f) => {
                    return Err(RowpipeError::validation(format!(
                        "field '{f}' cannot be updated"
                    )));
                }
                other => {
                    return Err(RowpipeError::validation(format!("unknown field '{other}'")));
                }
            }
        }

        if patch.is_empty() {
            return Err(RowpipeError::validation("patch has no fields to update"));
        }
        Ok(patch)
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.category.is_none() && self.price.is_none() && self.stock.is_none()
    }

    /// Apply the patch to an in-memory record.
    pub fn apply(&self, record: &mut CanonicalRecord, at: DateTime<Utc>) {
        if let Some(name) = &self.name {
            record.name = name.clone();
        }
        if let Some(category) = &self.category {
            record.category = category.clone();
        }
        if let Some(price) = self.price {
            record.price = price;
        }
        if let Some(stock) = self.stock {
            record.stock = stock;
        }
        record.updated_at = Some(at);
    }
}

// ---------------------------------------------------------------------------
// Locator
// ---------------------------------------------------------------------------

/// Bucket/key address of one object in the object source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    pub bucket: String,
    pub key: String,
}

impl Locator {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

impl std::str::FromStr for Locator {
    type Err = RowpipeError;

    /// Accepts `bucket/key/with/slashes` or `scheme://bucket/key`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (bucket, key) = if s.contains("://") {
            let url = Url::parse(s)
                .map_err(|e| RowpipeError::validation(format!("invalid locator '{s}': {e}")))?;
            let bucket = url.host_str().unwrap_or_default().to_string();
            let key = url.path().trim_start_matches('/').to_string();
            (bucket, key)
        } else {
            match s.split_once('/') {
                Some((bucket, key)) => (bucket.to_string(), key.to_string()),
                None => (String::new(), String::new()),
            }
        };

        if bucket.is_empty() || key.is_empty() {
            return Err(RowpipeError::validation(format!(
                "locator '{s}' must have the form bucket/key"
            )));
        }
        Ok(Self { bucket, key })
    }
}

// ---------------------------------------------------------------------------
// BatchOutcome
// ---------------------------------------------------------------------------

/// One per-row failure recorded during a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowError {
    /// 1-based data row index (blank lines and the header are not counted).
    pub row: usize,
    /// 1-based physical line in the source text.
    pub line: usize,
    /// `missing_identity`, `persistence_failed`, ...
    pub kind: String,
    pub message: String,
}

/// Aggregate result of one batch run, handed to the notifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Originating batch identity (the source locator).
    pub batch_id: String,
    /// SHA-256 of the source bytes.
    pub digest: String,
    pub total: usize,
    pub succeeded: usize,
    pub rejected: usize,
    pub failed: usize,
    /// `succeeded / total`, 0.0 for an empty batch.
    pub success_rate: f64,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RowError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> CanonicalRecord {
        CanonicalRecord {
            id: "sku-1".into(),
            timestamp: 1_700_000_000_000,
            name: "Widget".into(),
            category: "tools".into(),
            price: 9.5,
            stock: 3,
            source: Source::File("uploads/items.csv".into()),
            processed_at: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
            processor_version: PROCESSOR_VERSION.into(),
            updated_at: None,
        }
    }

    #[test]
    fn record_serializes_flat_source() {
        let json = serde_json::to_value(sample_record()).expect("serialize");
        assert_eq!(json["source"], "file");
        assert_eq!(json["source_detail"], "uploads/items.csv");
        assert!(json.get("updated_at").is_none());

        let parsed: CanonicalRecord = serde_json::from_value(json).expect("deserialize");
        assert_eq!(parsed, sample_record());
    }

    #[test]
    fn source_from_parts() {
        assert_eq!(
            Source::from_parts("api", "10.0.0.1".into()).unwrap(),
            Source::Api("10.0.0.1".into())
        );
        assert!(Source::from_parts("queue", "x".into()).is_err());
    }

    #[test]
    fn locator_parses_both_forms() {
        let plain: Locator = "uploads/2024/items.csv".parse().unwrap();
        assert_eq!(plain, Locator::new("uploads", "2024/items.csv"));

        let url: Locator = "s3://uploads/items.csv".parse().unwrap();
        assert_eq!(url, Locator::new("uploads", "items.csv"));
        assert_eq!(url.to_string(), "uploads/items.csv");

        assert!("items.csv".parse::<Locator>().is_err());
        assert!("uploads/".parse::<Locator>().is_err());
    }

    #[test]
    fn patch_accepts_known_fields() {
        let patch = RecordPatch::parse([("price", "12.5"), ("stock", "4"), ("name", "Gadget")])
            .expect("valid patch");
        assert_eq!(patch.price, Some(12.5));
        assert_eq!(patch.stock, Some(4));
        assert_eq!(patch.name.as_deref(), Some("Gadget"));
        assert!(patch.category.is_none());

        let mut record = sample_record();
        let now = Utc::now();
        patch.apply(&mut record, now);
        assert_eq!(record.name, "Gadget");
        assert_eq!(record.category, "tools");
        assert_eq!(record.updated_at, Some(now));
    }

    #[test]
    fn patch_rejects_unknown_and_key_fields() {
        let err = RecordPatch::parse([("colour", "red")]).unwrap_err();
        assert!(err.to_string().contains("unknown field 'colour'"));

        let err = RecordPatch::parse([("id", "other")]).unwrap_err();
        assert!(err.to_string().contains("cannot be updated"));

        assert!(RecordPatch::parse([("price", "-1")]).is_err());
        assert!(RecordPatch::parse([("stock", "2.5")]).is_err());
        assert!(RecordPatch::parse(Vec::<(&str, &str)>::new()).is_err());
    }
}
