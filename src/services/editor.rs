//! Interactive segment rule editor
//!
//! [`RuleTreeEditor`] owns the live rule tree of a segment being built and
//! coordinates it with the outside world:
//!
//! - every edit swaps in a whole new tree and bumps the tree revision, which
//!   drops the cached audience size;
//! - audience previews are issued as tickets and only the most recently issued
//!   one, answered for an unchanged tree, is ever applied;
//! - generated trees are staged next to the live tree and only replace it when
//!   explicitly applied;
//! - failures of remote calls surface as dismissable notices and never touch
//!   the tree.
//!
//! Groups can be collapsed in the outline. That view state follows nodes
//! across removals and is dropped when a generated tree replaces the live one.

use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::config::EditorConfig;
use crate::models::{CreateSegmentRequest, CreatedSegment, NodePath, RuleTree, RuleTreeError, Segment};
use crate::services::collaborators::{AudienceEvaluator, RuleGenerator, SegmentStore};
use crate::services::outline::{render_collapsible_outline, OutlineLine};
use crate::services::rule_tree::ConditionUpdate;
use crate::utils::validation::{validate_generation_query, MAX_QUERY_LEN};
use crate::utils::{AppError, AppResult};

/// Errors returned by editor operations
#[derive(Debug, Error)]
pub enum EditorError {
    #[error(transparent)]
    Tree(#[from] RuleTreeError),

    #[error("a rule generation request is already in progress")]
    GenerationInFlight,

    #[error("a generated rule set is waiting to be applied or discarded")]
    StagedTreePending,

    #[error("there is no generated rule set to apply")]
    NothingStaged,

    #[error("describe the audience in 1 to {} characters", MAX_QUERY_LEN)]
    InvalidQuery,

    #[error("rule generation failed: {0}")]
    GenerationFailed(String),

    #[error("segment was already saved as {0}")]
    Finalized(String),

    #[error(transparent)]
    Service(#[from] AppError),
}

/// Where the generated-rules flow currently stands
#[derive(Debug, Clone, PartialEq, Default)]
pub enum GenerationState {
    #[default]
    Idle,
    Generating {
        seq: u64,
    },
    PreviewReady(RuleTree),
    Failed(String),
}

/// Source of an inline notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Preview,
    Submit,
}

/// Dismissable message shown next to the editor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorNotice {
    pub kind: NoticeKind,
    pub message: String,
}

/// An issued audience preview request
#[derive(Debug, Clone)]
pub struct PreviewTicket {
    seq: u64,
    revision: u64,
    rules: Arc<RuleTree>,
}

impl PreviewTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Tree snapshot to send for evaluation
    pub fn rules(&self) -> &RuleTree {
        &self.rules
    }
}

/// Result of handing a preview response back to the editor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewOutcome {
    Applied(u64),
    Failed(String),
    /// A newer request was issued or the tree changed; the response was dropped
    Superseded,
}

/// An issued rule generation request
#[derive(Debug, Clone)]
pub struct GenerationTicket {
    seq: u64,
    query: String,
}

impl GenerationTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn query(&self) -> &str {
        &self.query
    }
}

/// Editing session for one segment
#[derive(Debug)]
pub struct RuleTreeEditor {
    segment: Segment,
    revision: u64,
    next_preview_seq: u64,
    outstanding_preview: Option<u64>,
    generation: GenerationState,
    next_generation_seq: u64,
    notice: Option<EditorNotice>,
    persisted_as: Option<CreatedSegment>,
    collapsed: BTreeSet<NodePath>,
    max_visual_depth: usize,
}

impl RuleTreeEditor {
    /// Start from an empty AND root
    pub fn new(config: &EditorConfig) -> Self {
        Self::with_tree(config, RuleTree::new())
    }

    /// Start from an existing tree, e.g. a previously saved segment
    pub fn with_tree(config: &EditorConfig, tree: RuleTree) -> Self {
        Self {
            segment: Segment::new(String::new(), tree),
            revision: 0,
            next_preview_seq: 0,
            outstanding_preview: None,
            generation: GenerationState::Idle,
            next_generation_seq: 0,
            notice: None,
            persisted_as: None,
            collapsed: BTreeSet::new(),
            max_visual_depth: config.max_visual_depth,
        }
    }

    // ==================== Tree ====================

    /// Shared handle to the live tree; holders keep seeing this version after later edits
    pub fn tree(&self) -> &Arc<RuleTree> {
        self.segment.rules()
    }

    /// Wire-format projection of the live tree
    pub fn serialize(&self) -> RuleTree {
        self.segment.rules().as_ref().clone()
    }

    /// Number of committed tree changes
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Last applied audience size for the current tree
    pub fn audience_size(&self) -> Option<u64> {
        self.segment.audience_size()
    }

    /// Outline of the live tree without the children of collapsed groups
    pub fn outline(&self) -> Vec<OutlineLine> {
        render_collapsible_outline(self.segment.rules(), self.max_visual_depth, &self.collapsed)
    }

    /// Groups start expanded; conditions have nothing to collapse
    pub fn is_expanded(&self, path: &NodePath) -> bool {
        !self.collapsed.contains(path)
    }

    /// Collapse or expand the group at `path`, returning whether it is now expanded
    pub fn toggle_expanded(&mut self, path: &NodePath) -> Result<bool, EditorError> {
        if self.segment.rules().group_at(path).is_none() {
            return Err(match self.segment.rules().node_at(path) {
                Some(_) => RuleTreeError::NotAGroup(path.clone()),
                None => RuleTreeError::PathNotFound(path.clone()),
            }
            .into());
        }
        if self.collapsed.remove(path) {
            return Ok(true);
        }
        self.collapsed.insert(path.clone());
        Ok(false)
    }

    pub fn add_condition(&mut self, path: &NodePath) -> Result<(), EditorError> {
        self.ensure_editable()?;
        let next = self.segment.rules().add_condition(path)?;
        self.commit(next);
        Ok(())
    }

    pub fn add_group(&mut self, path: &NodePath) -> Result<(), EditorError> {
        self.ensure_editable()?;
        let next = self.segment.rules().add_group(path)?;
        self.commit(next);
        Ok(())
    }

    pub fn remove_node(&mut self, path: &NodePath) -> Result<(), EditorError> {
        self.ensure_editable()?;
        let next = self.segment.rules().remove_node(path)?;
        self.collapsed = std::mem::take(&mut self.collapsed)
            .into_iter()
            .filter_map(|group| group.after_removal(path))
            .collect();
        self.commit(next);
        Ok(())
    }

    pub fn update_condition(
        &mut self,
        path: &NodePath,
        update: ConditionUpdate,
    ) -> Result<(), EditorError> {
        self.ensure_editable()?;
        let next = self.segment.rules().update_condition(path, update)?;
        self.commit(next);
        Ok(())
    }

    pub fn toggle_group_operator(&mut self, path: &NodePath) -> Result<(), EditorError> {
        self.ensure_editable()?;
        let next = self.segment.rules().toggle_group_operator(path)?;
        self.commit(next);
        Ok(())
    }

    fn ensure_editable(&self) -> Result<(), EditorError> {
        match self.persisted_as {
            Some(ref created) => Err(EditorError::Finalized(created.id.clone())),
            None => Ok(()),
        }
    }

    fn commit(&mut self, next: RuleTree) {
        self.collapsed.retain(|path| next.group_at(path).is_some());
        self.segment.replace_rules(next);
        self.revision += 1;
        debug!(revision = self.revision, "Rule tree replaced");
    }

    // ==================== Audience preview ====================

    /// Issue a preview request for the current tree, superseding any earlier one
    pub fn begin_preview(&mut self) -> PreviewTicket {
        self.next_preview_seq += 1;
        let seq = self.next_preview_seq;
        if let Some(previous) = self.outstanding_preview.replace(seq) {
            debug!(previous, seq, "Superseding outstanding preview request");
        }
        PreviewTicket {
            seq,
            revision: self.revision,
            rules: Arc::clone(self.segment.rules()),
        }
    }

    /// Hand back the response to a preview request.
    ///
    /// Only the most recently issued request is applied, and only while the
    /// tree is still the one it was issued for.
    pub fn complete_preview(&mut self, ticket: PreviewTicket, result: AppResult<u64>) -> PreviewOutcome {
        if self.outstanding_preview != Some(ticket.seq) {
            warn!(seq = ticket.seq, "Dropping response to superseded preview request");
            return PreviewOutcome::Superseded;
        }
        self.outstanding_preview = None;

        if ticket.revision != self.revision {
            warn!(
                seq = ticket.seq,
                issued_for = ticket.revision,
                current = self.revision,
                "Dropping preview response for an outdated tree"
            );
            return PreviewOutcome::Superseded;
        }

        match result {
            Ok(size) => {
                info!(seq = ticket.seq, audience_size = size, "Audience preview applied");
                self.segment.record_audience_size(size);
                self.clear_notice(NoticeKind::Preview);
                PreviewOutcome::Applied(size)
            }
            Err(e) => {
                warn!(seq = ticket.seq, "Audience preview failed: {}", e);
                let message = e.user_message();
                self.raise_notice(NoticeKind::Preview, message.clone());
                PreviewOutcome::Failed(message)
            }
        }
    }

    /// Whether the latest issued preview request is still unanswered
    pub fn preview_in_flight(&self) -> bool {
        self.outstanding_preview.is_some()
    }

    /// Request and apply an audience preview in one step
    pub async fn preview(&mut self, evaluator: &dyn AudienceEvaluator) -> PreviewOutcome {
        let ticket = self.begin_preview();
        let result = evaluator.audience_size(ticket.rules()).await;
        self.complete_preview(ticket, result)
    }

    // ==================== Rule generation ====================

    pub fn generation(&self) -> &GenerationState {
        &self.generation
    }

    /// Start generating rules from a description; also the retry path after a failure
    pub fn begin_generation(&mut self, query: &str) -> Result<GenerationTicket, EditorError> {
        self.ensure_editable()?;
        match self.generation {
            GenerationState::Generating { .. } => return Err(EditorError::GenerationInFlight),
            GenerationState::PreviewReady(_) => return Err(EditorError::StagedTreePending),
            GenerationState::Idle | GenerationState::Failed(_) => {}
        }
        if !validate_generation_query(query) {
            return Err(EditorError::InvalidQuery);
        }

        self.next_generation_seq += 1;
        let seq = self.next_generation_seq;
        self.generation = GenerationState::Generating { seq };
        info!(seq, "Rule generation started");

        Ok(GenerationTicket {
            seq,
            query: query.trim().to_string(),
        })
    }

    /// Hand back the generator's answer; returns false when the ticket was
    /// cancelled or replaced in the meantime
    pub fn complete_generation(
        &mut self,
        ticket: GenerationTicket,
        result: AppResult<RuleTree>,
    ) -> bool {
        match self.generation {
            GenerationState::Generating { seq } if seq == ticket.seq => {}
            _ => {
                warn!(seq = ticket.seq, "Dropping response to stale generation request");
                return false;
            }
        }

        match result {
            Ok(tree) => self.stage_generated(tree),
            Err(e) => {
                warn!(seq = ticket.seq, "Rule generation failed: {}", e);
                self.generation = GenerationState::Failed(e.user_message());
            }
        }
        true
    }

    /// Hold an externally produced tree for review without touching the live tree
    pub fn stage_generated(&mut self, tree: RuleTree) {
        info!(
            conditions = tree.condition_count(),
            "Generated rules staged for review"
        );
        self.generation = GenerationState::PreviewReady(tree);
    }

    /// Abandon an in-flight generation request
    pub fn cancel_generation(&mut self) -> bool {
        if matches!(self.generation, GenerationState::Generating { .. }) {
            self.generation = GenerationState::Idle;
            true
        } else {
            false
        }
    }

    pub fn staged_tree(&self) -> Option<&RuleTree> {
        match self.generation {
            GenerationState::PreviewReady(ref tree) => Some(tree),
            _ => None,
        }
    }

    /// Replace the live tree with the staged one
    pub fn apply_generated(&mut self) -> Result<(), EditorError> {
        self.ensure_editable()?;
        match std::mem::take(&mut self.generation) {
            GenerationState::PreviewReady(tree) => {
                self.collapsed.clear();
                self.commit(tree);
                info!("Generated rules applied");
                Ok(())
            }
            other => {
                self.generation = other;
                Err(EditorError::NothingStaged)
            }
        }
    }

    /// Drop the staged tree; the live tree and its audience size are untouched
    pub fn discard_generated(&mut self) -> Result<(), EditorError> {
        if self.staged_tree().is_none() {
            return Err(EditorError::NothingStaged);
        }
        self.generation = GenerationState::Idle;
        debug!("Generated rules discarded");
        Ok(())
    }

    /// Clear a generation failure; returns false when there was none
    pub fn dismiss_generation_error(&mut self) -> bool {
        if matches!(self.generation, GenerationState::Failed(_)) {
            self.generation = GenerationState::Idle;
            true
        } else {
            false
        }
    }

    /// Generate rules and stage them in one step
    pub async fn generate(
        &mut self,
        generator: &dyn RuleGenerator,
        query: &str,
    ) -> Result<&RuleTree, EditorError> {
        let ticket = self.begin_generation(query)?;
        let result = generator.generate_rules(ticket.query()).await;
        self.complete_generation(ticket, result);

        match self.generation {
            GenerationState::PreviewReady(ref tree) => Ok(tree),
            GenerationState::Failed(ref message) => {
                Err(EditorError::GenerationFailed(message.clone()))
            }
            _ => Err(EditorError::NothingStaged),
        }
    }

    // ==================== Notices ====================

    pub fn notice(&self) -> Option<&EditorNotice> {
        self.notice.as_ref()
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    fn raise_notice(&mut self, kind: NoticeKind, message: String) {
        self.notice = Some(EditorNotice { kind, message });
    }

    fn clear_notice(&mut self, kind: NoticeKind) {
        if self.notice.as_ref().is_some_and(|n| n.kind == kind) {
            self.notice = None;
        }
    }

    // ==================== Submission ====================

    pub fn persisted_as(&self) -> Option<&CreatedSegment> {
        self.persisted_as.as_ref()
    }

    pub fn is_finalized(&self) -> bool {
        self.persisted_as.is_some()
    }

    /// Persist the segment under `name`; on success the editor becomes read-only
    pub async fn submit(
        &mut self,
        name: &str,
        store: &dyn SegmentStore,
    ) -> Result<CreatedSegment, EditorError> {
        self.ensure_editable()?;

        let request = CreateSegmentRequest::new(name, self.serialize());
        if let Err(e) = request.validate() {
            let e = AppError::from(e);
            self.raise_notice(NoticeKind::Submit, e.user_message());
            return Err(e.into());
        }

        match store.create_segment(&request).await {
            Ok(created) => {
                info!(id = %created.id, name = %request.name, "Segment saved");
                self.segment.set_name(request.name);
                self.clear_notice(NoticeKind::Submit);
                self.persisted_as = Some(created.clone());
                Ok(created)
            }
            Err(e) => {
                warn!("Saving segment '{}' failed: {}", request.name, e);
                self.raise_notice(NoticeKind::Submit, e.user_message());
                Err(e.into())
            }
        }
    }

    pub fn segment(&self) -> &Segment {
        &self.segment
    }
}
