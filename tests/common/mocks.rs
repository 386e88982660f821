//! Mock collaborators for testing
//!
//! Provides in-memory implementations of the backend-facing traits for
//! isolated testing without a CRM backend.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crm_segments::models::{
    CreateSegmentRequest, CreatedSegment, CustomerProfile, RuleTree, SegmentSummary,
};
use crm_segments::services::{AudienceEvaluator, AudienceMatcher, RuleGenerator, SegmentStore};
use crm_segments::{AppError, AppResult};

/// Types of errors the mock can simulate
#[derive(Debug, Clone)]
pub enum MockError {
    /// Connection refused
    ConnectionRefused,
    /// Timeout
    Timeout,
    /// Session no longer valid
    Unauthorized,
    /// Internal server error
    InternalError(String),
}

impl From<MockError> for AppError {
    fn from(error: MockError) -> Self {
        match error {
            MockError::ConnectionRefused => AppError::Connection("connection refused".to_string()),
            MockError::Timeout => AppError::Timeout,
            MockError::Unauthorized => AppError::Unauthorized("session expired".to_string()),
            MockError::InternalError(message) => AppError::Backend {
                status: 500,
                message,
            },
        }
    }
}

/// Mock CRM backend evaluating rules against in-memory customers
#[derive(Debug)]
pub struct MockCrmBackend {
    matcher: AudienceMatcher,
    /// Generated trees keyed by query, as raw JSON
    generated: Arc<RwLock<HashMap<String, serde_json::Value>>>,
    segments: Arc<RwLock<Vec<SegmentSummary>>>,
    /// Simulate errors when set
    pub error_mode: Arc<RwLock<Option<MockError>>>,
}

impl MockCrmBackend {
    /// Create a mock backend holding the given customers
    pub fn new(customers: Vec<CustomerProfile>) -> Self {
        Self {
            matcher: AudienceMatcher::new(customers),
            generated: Arc::new(RwLock::new(HashMap::new())),
            segments: Arc::new(RwLock::new(Vec::new())),
            error_mode: Arc::new(RwLock::new(None)),
        }
    }

    /// Set error mode to simulate failures
    pub fn set_error_mode(&self, error: MockError) {
        *self.error_mode.write().unwrap() = Some(error);
    }

    /// Clear error mode
    pub fn clear_error_mode(&self) {
        *self.error_mode.write().unwrap() = None;
    }

    fn check_error(&self) -> AppResult<()> {
        if let Some(ref error) = *self.error_mode.read().unwrap() {
            return Err(error.clone().into());
        }
        Ok(())
    }

    /// Register the raw rules the generator answers for a query
    pub fn on_query(&self, query: &str, rules: serde_json::Value) {
        self.generated
            .write()
            .unwrap()
            .insert(query.to_string(), rules);
    }

    pub fn saved_segments(&self) -> Vec<SegmentSummary> {
        self.segments.read().unwrap().clone()
    }
}

#[async_trait]
impl AudienceEvaluator for MockCrmBackend {
    async fn audience_size(&self, rules: &RuleTree) -> AppResult<u64> {
        self.check_error()?;
        Ok(self.matcher.audience_size(rules))
    }
}

#[async_trait]
impl RuleGenerator for MockCrmBackend {
    async fn generate_rules(&self, query: &str) -> AppResult<RuleTree> {
        self.check_error()?;
        let raw = self
            .generated
            .read()
            .unwrap()
            .get(query)
            .cloned()
            .ok_or_else(|| AppError::Backend {
                status: 422,
                message: format!("no rules for '{}'", query),
            })?;
        Ok(RuleTree::from_value(&raw)?)
    }
}

#[async_trait]
impl SegmentStore for MockCrmBackend {
    async fn create_segment(&self, request: &CreateSegmentRequest) -> AppResult<CreatedSegment> {
        self.check_error()?;
        let mut segments = self.segments.write().unwrap();
        let id = format!("seg{:04}", segments.len() + 1);
        segments.push(SegmentSummary {
            id: id.clone(),
            name: request.name.clone(),
            rules: request.rules.clone(),
            audience_size: Some(self.matcher.audience_size(&request.rules)),
            created_at: Some(Utc::now()),
        });
        Ok(CreatedSegment { id })
    }

    async fn list_segments(&self) -> AppResult<Vec<SegmentSummary>> {
        self.check_error()?;
        Ok(self.saved_segments())
    }

    async fn get_segment(&self, id: &str) -> AppResult<Option<SegmentSummary>> {
        self.check_error()?;
        Ok(self
            .segments
            .read()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }
}
