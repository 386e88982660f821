//! Local rule tree evaluation
//!
//! Evaluates a rule tree against customer profiles held in memory. The backend
//! remains the authority on audience sizes; this is used for offline estimates
//! and for exercising the editor without a backend.

use crate::models::{
    AttributeValue, Condition, ConditionOperator, CustomerProfile, GroupOperator, RuleGroup,
    RuleNode, RuleTree,
};

/// Matches customers against segment rules
#[derive(Debug, Clone)]
pub struct AudienceMatcher {
    customers: Vec<CustomerProfile>,
}

impl AudienceMatcher {
    pub fn new(customers: Vec<CustomerProfile>) -> Self {
        Self { customers }
    }

    pub fn customers(&self) -> &[CustomerProfile] {
        &self.customers
    }

    /// Number of customers satisfying the tree
    pub fn audience_size(&self, tree: &RuleTree) -> u64 {
        let size = self.customers.iter().filter(|c| matches(tree, c)).count() as u64;
        tracing::debug!(
            "Local audience estimate: {} of {} customers match",
            size,
            self.customers.len()
        );
        size
    }
}

/// Whether one customer satisfies the tree
pub fn matches(tree: &RuleTree, customer: &CustomerProfile) -> bool {
    evaluate_group(tree.root(), customer)
}

/// An empty AND group matches everyone; an empty OR group matches nobody.
fn evaluate_group(group: &RuleGroup, customer: &CustomerProfile) -> bool {
    let mut children = group.rules.iter().map(|node| match node {
        RuleNode::Group(nested) => evaluate_group(nested, customer),
        RuleNode::Condition(condition) => evaluate_condition(condition, customer),
    });
    match group.operator {
        GroupOperator::And => children.all(|m| m),
        GroupOperator::Or => children.any(|m| m),
    }
}

/// A condition without a usable value, or on a missing attribute, never matches
fn evaluate_condition(condition: &Condition, customer: &CustomerProfile) -> bool {
    let matched = match customer.attribute(condition.field()) {
        AttributeValue::Number(actual) => condition
            .value()
            .as_f64()
            .map(|expected| compare_numbers(actual, condition.operator(), expected))
            .unwrap_or(false),
        AttributeValue::Date(actual) => condition
            .value()
            .as_date()
            .map(|expected| match condition.operator() {
                ConditionOperator::Before => actual < expected,
                ConditionOperator::After => actual > expected,
                ConditionOperator::Equals => actual == expected,
                _ => false,
            })
            .unwrap_or(false),
        AttributeValue::Missing => false,
    };

    tracing::trace!(
        "Condition evaluation: field='{}' operator='{}' value='{}' matched={}",
        condition.field(),
        condition.operator(),
        condition.value(),
        matched
    );
    matched
}

fn compare_numbers(actual: f64, operator: ConditionOperator, expected: f64) -> bool {
    match operator {
        ConditionOperator::GreaterThan => actual > expected,
        ConditionOperator::LessThan => actual < expected,
        ConditionOperator::Equals => (actual - expected).abs() < f64::EPSILON,
        ConditionOperator::NotEquals => (actual - expected).abs() >= f64::EPSILON,
        ConditionOperator::Before | ConditionOperator::After => false,
    }
}
