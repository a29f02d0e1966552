//! Position - Relative order reconciliation for ordered collections
//!
//! A move resource asks the remote system to place one entry (the source)
//! immediately before or after another entry (the target). Reading it back
//! means scanning the collection once, locating both entries by an
//! identifying field, and describing how far the observed order is from
//! the requested one.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// State attribute carrying the drift description of a move resource
pub const DRIFT_ATTRIBUTE: &str = "state_pos";

/// Requested placement of the source entry relative to the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    /// Source sits immediately prior to target
    Before,
    /// Source sits immediately after target
    After,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Before => "before",
            Relation::After => "after",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Relation {
    type Err = PositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "before" => Ok(Relation::Before),
            "after" => Ok(Relation::After),
            other => Err(PositionError::InvalidRelation(other.to_string())),
        }
    }
}

/// Structural errors raised while scanning a collection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("record at position {position} has no identifying field '{field}'")]
    MissingField { field: String, position: usize },

    #[error("record at position {position} is not an object")]
    MalformedRecord { position: usize },

    #[error("invalid relation '{0}', expected one of: before, after")]
    InvalidRelation(String),
}

/// A single repositioning request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRequest {
    pub source_key: String,
    pub target_key: String,
    pub relation: Relation,
}

impl MoveRequest {
    pub fn new(
        source_key: impl Into<String>,
        target_key: impl Into<String>,
        relation: Relation,
    ) -> Self {
        Self {
            source_key: source_key.into(),
            target_key: target_key.into(),
            relation,
        }
    }
}

/// 1-based positions of the source and target; `None` when absent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Positions {
    pub source: Option<usize>,
    pub target: Option<usize>,
}

/// Outcome of reading back a move request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionReport {
    pub source_key: String,
    pub target_key: String,
    pub source_pos: Option<usize>,
    pub target_pos: Option<usize>,
    pub consistent: bool,
    /// Drift description, empty when the order is as requested
    pub description: String,
}

impl PositionReport {
    pub fn has_drift(&self) -> bool {
        !self.description.is_empty()
    }
}

/// Render an identifying field value the way it is compared against keys.
///
/// Strings compare verbatim; everything else by its JSON text, so a numeric
/// `id: 3` matches the key `"3"`.
pub fn key_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Locate the source and target keys in a single pass.
///
/// The first record whose identifying field matches a key fixes that key's
/// position.
pub fn locate<'a, I>(
    records: I,
    field: &str,
    source_key: &str,
    target_key: &str,
) -> Result<Positions, PositionError>
where
    I: IntoIterator<Item = &'a serde_json::Value>,
{
    let mut positions = Positions::default();

    for (index, record) in records.into_iter().enumerate() {
        let position = index + 1;
        let object = record
            .as_object()
            .ok_or(PositionError::MalformedRecord { position })?;
        let value = object
            .get(field)
            .ok_or_else(|| PositionError::MissingField {
                field: field.to_string(),
                position,
            })?;

        let key = key_string(value);
        if positions.source.is_none() && key == source_key {
            positions.source = Some(position);
        }
        if positions.target.is_none() && key == target_key {
            positions.target = Some(position);
        }
    }

    Ok(positions)
}

/// Whether the located positions satisfy the relation.
///
/// A missing position is never consistent. A relation that could not be
/// parsed (`None`) places no constraint on the order.
pub fn is_consistent(positions: Positions, relation: Option<Relation>) -> bool {
    let (Some(source), Some(target)) = (positions.source, positions.target) else {
        return false;
    };
    match relation {
        Some(Relation::Before) => source + 1 == target,
        Some(Relation::After) => source == target + 1,
        None => true,
    }
}

/// Describe how the observed order departs from the requested relation
pub fn describe_drift(
    field: &str,
    source_key: &str,
    target_key: &str,
    positions: Positions,
    relation: Option<Relation>,
) -> String {
    match (positions.source, positions.target) {
        (None, None) => format!(
            "{}({}) and target({}) were deleted",
            field, source_key, target_key
        ),
        (None, Some(_)) => format!("{}({}) was deleted", field, source_key),
        (Some(_), None) => format!("target({}) was deleted", target_key),
        (Some(source), Some(target)) => {
            if is_consistent(positions, relation) {
                return String::new();
            }
            let offset = source as i64 - target as i64;
            if offset > 0 {
                format!(
                    "{}({}) is {} behind target({})",
                    field, source_key, offset, target_key
                )
            } else {
                format!(
                    "{}({}) is {} ahead of target({})",
                    field, source_key, -offset, target_key
                )
            }
        }
    }
}

/// Locate, check and describe in one call
pub fn report<'a, I>(
    records: I,
    field: &str,
    source_key: &str,
    target_key: &str,
    relation: Option<Relation>,
) -> Result<PositionReport, PositionError>
where
    I: IntoIterator<Item = &'a serde_json::Value>,
{
    let positions = locate(records, field, source_key, target_key)?;
    let description = describe_drift(field, source_key, target_key, positions, relation);

    Ok(PositionReport {
        source_key: source_key.to_string(),
        target_key: target_key.to_string(),
        source_pos: positions.source,
        target_pos: positions.target,
        consistent: is_consistent(positions, relation),
        description,
    })
}

/// Report for a fully parsed move request
pub fn report_request<'a, I>(
    records: I,
    field: &str,
    request: &MoveRequest,
) -> Result<PositionReport, PositionError>
where
    I: IntoIterator<Item = &'a serde_json::Value>,
{
    report(
        records,
        field,
        &request.source_key,
        &request.target_key,
        Some(request.relation),
    )
}
