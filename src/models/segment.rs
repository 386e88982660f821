//! Segment data model and backend payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use validator::Validate;

use super::RuleTree;

/// A segment being edited: a name, its rule tree, and the last known audience size.
///
/// The audience size is a cache of the last remote evaluation and is cleared
/// every time the rules are replaced.
#[derive(Debug, Clone, Default)]
pub struct Segment {
    name: String,
    rules: Arc<RuleTree>,
    audience_size: Option<u64>,
}

impl Segment {
    pub fn new(name: impl Into<String>, rules: RuleTree) -> Self {
        Self {
            name: name.into(),
            rules: Arc::new(rules),
            audience_size: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn rules(&self) -> &Arc<RuleTree> {
        &self.rules
    }

    pub fn audience_size(&self) -> Option<u64> {
        self.audience_size
    }

    /// Swap in a new tree and drop the cached audience size
    pub fn replace_rules(&mut self, rules: RuleTree) {
        self.rules = Arc::new(rules);
        self.audience_size = None;
    }

    pub fn record_audience_size(&mut self, size: u64) {
        self.audience_size = Some(size);
    }
}

/// Body of the audience preview call
#[derive(Debug, Clone, Serialize)]
pub struct PreviewRequest<'a> {
    pub rules: &'a RuleTree,
}

/// Response of the audience preview call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewResponse {
    #[serde(rename = "audienceSize")]
    pub audience_size: u64,
}

/// Body of the rule generation call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRulesRequest {
    pub query: String,
}

/// Response of the rule generation call.
///
/// The rules are kept as raw JSON so a malformed tree is reported as a shape
/// error instead of a transport error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRulesResponse {
    pub rules: serde_json::Value,
}

/// Request to create a segment
#[derive(Debug, Clone, Serialize, Validate)]
pub struct CreateSegmentRequest {
    #[validate(length(min = 1, max = 120, message = "segment name must be 1-120 characters"))]
    pub name: String,
    pub rules: RuleTree,
}

impl CreateSegmentRequest {
    pub fn new(name: impl Into<String>, rules: RuleTree) -> Self {
        Self {
            name: name.into().trim().to_string(),
            rules,
        }
    }
}

/// Backend document without an identifier
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("segment document has neither `_id` nor `id`")]
pub struct MissingSegmentId;

/// Identifier members as sent by the backend; documents may carry `_id`, its
/// `id` virtual, or both
#[derive(Debug, Default, Deserialize)]
struct SegmentIdWire {
    #[serde(rename = "_id", default)]
    object_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

impl SegmentIdWire {
    fn resolve(self) -> Result<String, MissingSegmentId> {
        self.object_id.or(self.id).ok_or(MissingSegmentId)
    }
}

/// Identifier returned by the backend for a created segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SegmentIdWire")]
pub struct CreatedSegment {
    pub id: String,
}

impl TryFrom<SegmentIdWire> for CreatedSegment {
    type Error = MissingSegmentId;

    fn try_from(wire: SegmentIdWire) -> Result<Self, Self::Error> {
        Ok(Self { id: wire.resolve()? })
    }
}

/// Segment as listed by the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "SegmentSummaryWire")]
pub struct SegmentSummary {
    pub id: String,

    pub name: String,

    pub rules: RuleTree,

    #[serde(rename = "audienceSize", default)]
    pub audience_size: Option<u64>,

    #[serde(rename = "createdAt", default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct SegmentSummaryWire {
    #[serde(flatten)]
    ids: SegmentIdWire,
    name: String,
    rules: RuleTree,
    #[serde(rename = "audienceSize", default)]
    audience_size: Option<u64>,
    #[serde(rename = "createdAt", default)]
    created_at: Option<DateTime<Utc>>,
}

impl TryFrom<SegmentSummaryWire> for SegmentSummary {
    type Error = MissingSegmentId;

    fn try_from(wire: SegmentSummaryWire) -> Result<Self, Self::Error> {
        Ok(Self {
            id: wire.ids.resolve()?,
            name: wire.name,
            rules: wire.rules,
            audience_size: wire.audience_size,
            created_at: wire.created_at,
        })
    }
}
