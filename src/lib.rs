//! CRM Segments Library
//!
//! Building blocks for editing customer segment rules: the rule tree model and
//! its path-addressed operations, an editor coordinating audience previews,
//! generated rules and persistence, and a client for the CRM backend API.

pub mod config;
pub mod logging;
pub mod models;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use models::{NodePath, RuleTree};
pub use services::{ConditionUpdate, CrmApiClient, RuleTreeEditor};
pub use utils::{AppError, AppResult};
