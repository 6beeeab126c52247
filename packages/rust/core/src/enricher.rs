//! Enrichment: the single place where canonical fields and defaults are derived.

use std::sync::Arc;

use chrono::DateTime;
use rowpipe_shared::{CanonicalRecord, EnrichmentConfig, PROCESSOR_VERSION, Source};
use uuid::Uuid;

use crate::clock::Clock;
use crate::validator::AcceptedRecord;

/// Turns accepted records into [`CanonicalRecord`]s.
pub struct Enricher {
    clock: Arc<dyn Clock>,
    file_category: String,
    api_category: String,
}

impl Enricher {
    pub fn new(clock: Arc<dyn Clock>, config: &EnrichmentConfig) -> Self {
        Self {
            clock,
            file_category: config.file_category_default.clone(),
            api_category: config.api_category_default.clone(),
        }
    }

    /// Produce exactly one record. Never fails: unusable numeric input becomes zero
    /// and a missing id is replaced by a fresh UUID.
    pub fn enrich(&self, accepted: AcceptedRecord, source: Source) -> CanonicalRecord {
        let timestamp = self.clock.now_millis();
        let default_category = match source {
            Source::File(_) => &self.file_category,
            Source::Api(_) => &self.api_category,
        };

        CanonicalRecord {
            id: accepted
                .id
                .unwrap_or_else(|| Uuid::now_v7().to_string()),
            timestamp,
            name: accepted.name,
            category: accepted
                .category
                .unwrap_or_else(|| default_category.clone()),
            price: accepted.price.as_deref().map(parse_price).unwrap_or(0.0),
            stock: accepted.stock.as_deref().map(parse_stock).unwrap_or(0),
            source,
            processed_at: DateTime::from_timestamp_millis(timestamp).unwrap_or_default(),
            processor_version: PROCESSOR_VERSION.to_string(),
            updated_at: None,
        }
    }
}

/// Non-negative decimal, or 0.0. A lone decimal comma is accepted.
pub fn parse_price(raw: &str) -> f64 {
    let raw = raw.trim();
    let normalized = if !raw.contains('.') && raw.matches(',').count() == 1 {
        raw.replace(',', ".")
    } else {
        raw.to_string()
    };

    match normalized.parse::<f64>() {
        Ok(price) if price.is_finite() && price >= 0.0 => price.abs(),
        _ => 0.0,
    }
}

/// Non-negative integer, or 0.
pub fn parse_stock(raw: &str) -> u64 {
    raw.trim().parse::<u64>().unwrap_or(0)
}
