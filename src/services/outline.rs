//! Recursive rendering of a rule tree into indented lines

use std::collections::BTreeSet;
use std::fmt;

use crate::models::{Condition, NodePath, NodeRef, RuleTree};

/// One rendered node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineLine {
    pub path: NodePath,
    /// Visual indent level, capped at the configured maximum
    pub indent: usize,
    pub label: String,
    /// Group whose children are hidden
    pub collapsed: bool,
}

/// Render every node in display order.
///
/// Nesting deeper than `max_visual_depth` keeps the deepest indent instead of
/// growing further; paths still carry the true position.
pub fn render_outline(tree: &RuleTree, max_visual_depth: usize) -> Vec<OutlineLine> {
    render_collapsible_outline(tree, max_visual_depth, &BTreeSet::new())
}

/// Like [`render_outline`], leaving out everything below the groups in `collapsed`
pub fn render_collapsible_outline(
    tree: &RuleTree,
    max_visual_depth: usize,
    collapsed: &BTreeSet<NodePath>,
) -> Vec<OutlineLine> {
    tree.walk()
        .into_iter()
        .filter(|(path, _)| !collapsed.iter().any(|group| group.is_ancestor_of(path)))
        .map(|(path, node)| OutlineLine {
            indent: path.depth().min(max_visual_depth),
            label: label(node),
            collapsed: matches!(node, NodeRef::Group(_)) && collapsed.contains(&path),
            path,
        })
        .collect()
}

fn label(node: NodeRef<'_>) -> String {
    match node {
        NodeRef::Group(group) => match group.rules.len() {
            0 => format!("{} (empty)", group.operator),
            1 => format!("{} (1 rule)", group.operator),
            n => format!("{} ({} rules)", group.operator, n),
        },
        NodeRef::Condition(condition) => condition_label(condition),
    }
}

fn condition_label(condition: &Condition) -> String {
    let value = if condition.value().is_empty() {
        "<no value>".to_string()
    } else {
        condition.value().to_string()
    };
    format!(
        "{} {} {}",
        condition.field().label(),
        condition.operator().label(),
        value
    )
}

impl fmt::Display for RuleTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in render_outline(self, usize::MAX) {
            writeln!(f, "{}{}", "  ".repeat(line.indent), line.label)?;
        }
        Ok(())
    }
}
