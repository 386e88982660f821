//! Seams between the rule editor and the outside world
//!
//! The editor never talks to the network directly. It is handed implementations
//! of these traits, which keeps it testable without a backend or a real session.

use async_trait::async_trait;
use std::sync::RwLock;

use crate::models::{CreateSegmentRequest, CreatedSegment, RuleTree, SegmentSummary, Session};
use crate::utils::AppResult;

/// Computes the audience size of a rule tree
#[async_trait]
pub trait AudienceEvaluator: Send + Sync {
    async fn audience_size(&self, rules: &RuleTree) -> AppResult<u64>;
}

/// Turns a natural-language description into a rule tree
#[async_trait]
pub trait RuleGenerator: Send + Sync {
    async fn generate_rules(&self, query: &str) -> AppResult<RuleTree>;
}

/// Persists finished segments
#[async_trait]
pub trait SegmentStore: Send + Sync {
    async fn create_segment(&self, request: &CreateSegmentRequest) -> AppResult<CreatedSegment>;

    async fn list_segments(&self) -> AppResult<Vec<SegmentSummary>>;

    async fn get_segment(&self, id: &str) -> AppResult<Option<SegmentSummary>>;
}

/// Accessor for the current user session
pub trait SessionProvider: Send + Sync {
    fn current_session(&self) -> Option<Session>;
}

/// In-memory session holder
#[derive(Debug, Default)]
pub struct StaticSession {
    session: RwLock<Option<Session>>,
}

impl StaticSession {
    pub fn new(session: Session) -> Self {
        Self {
            session: RwLock::new(Some(session)),
        }
    }

    /// A provider with nobody signed in
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, session: Session) {
        if let Ok(mut guard) = self.session.write() {
            *guard = Some(session);
        }
    }

    pub fn sign_out(&self) {
        if let Ok(mut guard) = self.session.write() {
            *guard = None;
        }
    }
}

impl SessionProvider for StaticSession {
    fn current_session(&self) -> Option<Session> {
        self.session.read().ok().and_then(|guard| guard.clone())
    }
}
