//! Business logic services

pub mod collaborators;
pub mod crm_api;
pub mod editor;
pub mod matcher;
pub mod outline;
pub mod rule_tree;

pub use collaborators::{
    AudienceEvaluator, RuleGenerator, SegmentStore, SessionProvider, StaticSession,
};
pub use crm_api::CrmApiClient;
pub use editor::{
    EditorError, EditorNotice, GenerationState, GenerationTicket, NoticeKind, PreviewOutcome,
    PreviewTicket, RuleTreeEditor,
};
pub use matcher::AudienceMatcher;
pub use outline::{render_collapsible_outline, render_outline, OutlineLine};
pub use rule_tree::ConditionUpdate;
