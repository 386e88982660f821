//! Rule tree editing and preview step definitions

use cucumber::gherkin::Step;
use cucumber::{then, when};

use crm_segments::models::{ConditionOperator, Field, GroupOperator, RuleValue};
use crm_segments::services::{AudienceEvaluator, ConditionUpdate, PreviewOutcome};

use crate::features::support::TestWorld;

fn parse_field(name: &str) -> Field {
    serde_json::from_value(serde_json::Value::String(name.to_string())).expect("known field")
}

fn parse_operator(name: &str) -> ConditionOperator {
    serde_json::from_value(serde_json::Value::String(name.to_string())).expect("known operator")
}

#[when(expr = "I add a condition to {string}")]
async fn add_condition(world: &mut TestWorld, path: String) {
    let result = world.editor.add_condition(&TestWorld::path(&path));
    world.record(result);
}

#[when(expr = "I add a group to {string}")]
async fn add_group(world: &mut TestWorld, path: String) {
    let result = world.editor.add_group(&TestWorld::path(&path));
    world.record(result);
}

#[when(expr = "I remove the node at {string}")]
async fn remove_node(world: &mut TestWorld, path: String) {
    let result = world.editor.remove_node(&TestWorld::path(&path));
    world.record(result);
}

#[when(expr = "I toggle the operator of {string}")]
async fn toggle_operator(world: &mut TestWorld, path: String) {
    let result = world.editor.toggle_group_operator(&TestWorld::path(&path));
    world.record(result);
}

#[when(expr = "I set the field of {string} to {string}")]
async fn set_field(world: &mut TestWorld, path: String, field: String) {
    let result = world.editor.update_condition(
        &TestWorld::path(&path),
        ConditionUpdate::Field(parse_field(&field)),
    );
    world.record(result);
}

#[when(expr = "I set the operator of {string} to {string}")]
async fn set_operator(world: &mut TestWorld, path: String, operator: String) {
    let result = world.editor.update_condition(
        &TestWorld::path(&path),
        ConditionUpdate::Operator(parse_operator(&operator)),
    );
    world.record(result);
}

#[when(expr = "I set the value of {string} to {string}")]
async fn set_value(world: &mut TestWorld, path: String, value: String) {
    let result = world.editor.update_condition(
        &TestWorld::path(&path),
        ConditionUpdate::Value(RuleValue::from(value)),
    );
    world.record(result);
}

#[when(expr = "I toggle the expansion of {string}")]
async fn toggle_expansion(world: &mut TestWorld, path: String) {
    let result = world.editor.toggle_expanded(&TestWorld::path(&path));
    world.record(result);
}

#[when("I preview the audience")]
async fn preview(world: &mut TestWorld) {
    let outcome = world.editor.preview(&*world.backend).await;
    world.last_preview = Some(outcome);
}

#[when(expr = "I issue {int} preview request(s)")]
async fn issue_previews(world: &mut TestWorld, count: usize) {
    for _ in 0..count {
        let ticket = world.editor.begin_preview();
        world.pending_previews.push(ticket);
    }
}

#[when("the latest preview response arrives first")]
async fn latest_arrives(world: &mut TestWorld) {
    let ticket = world.pending_previews.pop().expect("a pending preview");
    let result = world.backend.audience_size(ticket.rules()).await;
    world.last_preview = Some(world.editor.complete_preview(ticket, result));
}

#[when(expr = "the earliest preview response arrives reporting {int}")]
async fn earliest_arrives(world: &mut TestWorld, size: u64) {
    let ticket = world.pending_previews.remove(0);
    world.last_preview = Some(world.editor.complete_preview(ticket, Ok(size)));
}

#[then("the tree should serialize to:")]
async fn tree_serializes_to(world: &mut TestWorld, step: &Step) {
    let expected = step.docstring.as_deref().expect("a doc string").trim();
    let actual = serde_json::to_string(&world.editor.serialize()).unwrap();
    assert_eq!(actual, expected);
}

#[then(expr = "the tree should have {int} node(s)")]
async fn tree_node_count(world: &mut TestWorld, count: usize) {
    assert_eq!(world.editor.tree().node_count(), count);
}

#[then(expr = "the condition at {string} should use operator {string}")]
async fn condition_operator(world: &mut TestWorld, path: String, operator: String) {
    let tree = world.editor.tree();
    let condition = tree.condition_at(&TestWorld::path(&path)).expect("a condition");
    assert_eq!(condition.operator(), parse_operator(&operator));
}

#[then(expr = "the condition at {string} should have no value")]
async fn condition_without_value(world: &mut TestWorld, path: String) {
    let tree = world.editor.tree();
    let condition = tree.condition_at(&TestWorld::path(&path)).expect("a condition");
    assert!(condition.value().is_empty());
}

#[then(expr = "the group at {string} should use operator {string}")]
async fn group_operator(world: &mut TestWorld, path: String, operator: String) {
    let tree = world.editor.tree();
    let group = tree.group_at(&TestWorld::path(&path)).expect("a group");
    let expected = match operator.as_str() {
        "AND" => GroupOperator::And,
        "OR" => GroupOperator::Or,
        other => panic!("unknown group operator {}", other),
    };
    assert_eq!(group.operator, expected);
}

#[then(expr = "the audience size should be {int}")]
async fn audience_size(world: &mut TestWorld, size: u64) {
    assert_eq!(world.editor.audience_size(), Some(size));
}

#[then("the audience size should be unknown")]
async fn audience_size_unknown(world: &mut TestWorld) {
    assert_eq!(world.editor.audience_size(), None);
}

#[then("the stale preview response should be ignored")]
async fn stale_ignored(world: &mut TestWorld) {
    assert_eq!(world.last_preview, Some(PreviewOutcome::Superseded));
}

#[then(expr = "the outline should have {int} line(s)")]
async fn outline_lines(world: &mut TestWorld, count: usize) {
    assert_eq!(world.editor.outline().len(), count);
}

#[then(expr = "the group at {string} should be collapsed")]
async fn group_collapsed(world: &mut TestWorld, path: String) {
    assert!(!world.editor.is_expanded(&TestWorld::path(&path)));
}

#[then(expr = "the group at {string} should be expanded")]
async fn group_expanded(world: &mut TestWorld, path: String) {
    assert!(world.editor.is_expanded(&TestWorld::path(&path)));
}
