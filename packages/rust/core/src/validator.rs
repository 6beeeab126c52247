//! Structural validation of rows and API payloads.
//!
//! Validation only checks that identity fields are present. Numeric fields are
//! carried through untouched as raw strings; coercion is the enricher's job.

use rowpipe_shared::{RawRow, RejectReason, RowpipeError};
use serde_json::Value;

/// Canonical fields and the source column names that map onto them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Id,
    Name,
    Category,
    Price,
    Stock,
}

impl Field {
    /// Accepted column names, in priority order, compared case-insensitively.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Id => &["id"],
            Self::Name => &["nome", "name"],
            Self::Category => &["categoria", "category"],
            Self::Price => &["preco", "preço", "price"],
            Self::Stock => &["estoque", "quantidade", "stock"],
        }
    }

    /// Column name used in messages.
    pub fn primary(&self) -> &'static str {
        self.aliases()[0]
    }

    /// First usable (present, non-blank) value for this field.
    pub fn lookup(&self, row: &RawRow) -> Option<String> {
        self.aliases().iter().find_map(|alias| {
            row.iter()
                .filter(|(key, _)| key.trim().to_lowercase() == *alias)
                .map(|(_, value)| value.trim())
                .find(|value| !value.is_empty())
                .map(str::to_string)
        })
    }
}

/// A row or payload that passed validation. Optional fields are still raw text.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AcceptedRecord {
    /// Always set on the batch path; may be absent on the API path.
    pub id: Option<String>,
    pub name: String,
    pub category: Option<String>,
    pub price: Option<String>,
    pub stock: Option<String>,
}

/// Why validation refused an input, with a message suitable for callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: RejectReason,
    pub message: String,
}

impl Rejection {
    fn new(reason: RejectReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

impl From<Rejection> for RowpipeError {
    fn from(rejection: Rejection) -> Self {
        match rejection.reason {
            RejectReason::MalformedPayload => RowpipeError::MalformedPayload(rejection.message),
            reason => RowpipeError::rejected(reason, rejection.message),
        }
    }
}

/// Batch path: both id and name are required.
pub fn validate_row(row: &RawRow) -> Result<AcceptedRecord, Rejection> {
    let id = Field::Id.lookup(row);
    let name = Field::Name.lookup(row);

    match (id, name) {
        (Some(id), Some(name)) => Ok(accept(row, Some(id), name)),
        (None, None) => Err(Rejection::new(
            RejectReason::MissingIdentity,
            "fields 'id' and 'nome' are required",
        )),
        (None, Some(_)) => Err(Rejection::new(
            RejectReason::MissingIdentity,
            "field 'id' is required",
        )),
        (Some(_), None) => Err(Rejection::new(
            RejectReason::MissingIdentity,
            "field 'nome' is required",
        )),
    }
}

/// API path: interpret the body as a JSON object, then require a name.
/// An absent or blank body is treated as an empty object.
pub fn validate_payload(body: Option<&str>) -> Result<AcceptedRecord, Rejection> {
    let row = payload_to_row(body)?;
    let name = Field::Name.lookup(&row).ok_or_else(|| {
        Rejection::new(
            RejectReason::MissingIdentity,
            format!("Field '{}' is required", Field::Name.primary()),
        )
    })?;
    let id = Field::Id.lookup(&row);
    Ok(accept(&row, id, name))
}

/// Flatten a JSON object body into a [`RawRow`]. Scalars become their string
/// form, `null` is dropped and nested values are kept as JSON text.
pub fn payload_to_row(body: Option<&str>) -> Result<RawRow, Rejection> {
    let body = body.map(str::trim).filter(|b| !b.is_empty()).unwrap_or("{}");

    let value: Value = serde_json::from_str(body).map_err(|e| {
        Rejection::new(
            RejectReason::MalformedPayload,
            format!("request body is not valid JSON: {e}"),
        )
    })?;

    let Value::Object(map) = value else {
        return Err(Rejection::new(
            RejectReason::MalformedPayload,
            "request body must be a JSON object",
        ));
    };

    Ok(map
        .into_iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::Null => return None,
                Value::String(s) => s,
                other => other.to_string(),
            };
            Some((key, text))
        })
        .collect())
}

fn accept(row: &RawRow, id: Option<String>, name: String) -> AcceptedRecord {
    AcceptedRecord {
        id,
        name,
        category: Field::Category.lookup(row),
        price: Field::Price.lookup(row),
        stock: Field::Stock.lookup(row),
    }
}
