//! Path-addressed rule tree operations
//!
//! Every operation takes the current tree by reference and returns a brand new
//! tree. The input is never touched, so any holder of the previous tree keeps
//! observing the complete previous state.

use tracing::debug;

use crate::models::{
    Condition, ConditionOperator, Field, NodePath, RuleGroup, RuleNode, RuleTree, RuleTreeError,
    RuleValue,
};

/// One attribute change on a condition
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionUpdate {
    Field(Field),
    Operator(ConditionOperator),
    Value(RuleValue),
}

impl RuleTree {
    /// Append a default condition to the group at `path`
    pub fn add_condition(&self, path: &NodePath) -> Result<RuleTree, RuleTreeError> {
        self.rewrite(|root| {
            group_mut(root, path)?
                .rules
                .push(RuleNode::Condition(Condition::default()));
            Ok(())
        })
        .inspect(|_| debug!(path = %path, "Added condition"))
    }

    /// Append an empty AND group to the group at `path`
    pub fn add_group(&self, path: &NodePath) -> Result<RuleTree, RuleTreeError> {
        self.rewrite(|root| {
            group_mut(root, path)?
                .rules
                .push(RuleNode::Group(RuleGroup::default()));
            Ok(())
        })
        .inspect(|_| debug!(path = %path, "Added group"))
    }

    /// Remove the node at `path` together with its subtree
    pub fn remove_node(&self, path: &NodePath) -> Result<RuleTree, RuleTreeError> {
        let (parent_path, index) = path.split_last().ok_or(RuleTreeError::RootNotRemovable)?;
        self.rewrite(|root| {
            let parent =
                group_mut(root, &parent_path).map_err(|_| RuleTreeError::PathNotFound(path.clone()))?;
            if index >= parent.rules.len() {
                return Err(RuleTreeError::PathNotFound(path.clone()));
            }
            parent.rules.remove(index);
            Ok(())
        })
        .inspect(|_| debug!(path = %path, "Removed node"))
    }

    /// Change one attribute of the condition at `path`.
    ///
    /// A field change keeps the operator when the new field still allows it and
    /// otherwise falls back to the field's default operator; the value is cleared
    /// whenever the value kind changes.
    pub fn update_condition(
        &self,
        path: &NodePath,
        update: ConditionUpdate,
    ) -> Result<RuleTree, RuleTreeError> {
        self.rewrite(|root| {
            let condition = condition_mut(root, path)?;
            match update {
                ConditionUpdate::Field(field) => {
                    condition.set_field(field);
                    Ok(())
                }
                ConditionUpdate::Operator(operator) => condition.set_operator(operator),
                ConditionUpdate::Value(value) => condition.set_value(value),
            }
        })
        .inspect(|_| debug!(path = %path, "Updated condition"))
    }

    /// Flip the connective of the group at `path` between AND and OR
    pub fn toggle_group_operator(&self, path: &NodePath) -> Result<RuleTree, RuleTreeError> {
        self.rewrite(|root| {
            let group = group_mut(root, path)?;
            group.operator = group.operator.toggled();
            Ok(())
        })
        .inspect(|_| debug!(path = %path, "Toggled group operator"))
    }

    fn rewrite<F>(&self, apply: F) -> Result<RuleTree, RuleTreeError>
    where
        F: FnOnce(&mut RuleGroup) -> Result<(), RuleTreeError>,
    {
        let mut next = self.clone();
        apply(next.root_mut())?;
        Ok(next)
    }
}

fn group_mut<'a>(root: &'a mut RuleGroup, path: &NodePath) -> Result<&'a mut RuleGroup, RuleTreeError> {
    let last = path.depth();
    let mut current = root;
    for (step, &index) in path.indices().iter().enumerate() {
        current = match current.rules.get_mut(index) {
            Some(RuleNode::Group(group)) => group,
            Some(RuleNode::Condition(_)) if step + 1 == last => {
                return Err(RuleTreeError::NotAGroup(path.clone()))
            }
            _ => return Err(RuleTreeError::PathNotFound(path.clone())),
        };
    }
    Ok(current)
}

fn condition_mut<'a>(root: &'a mut RuleGroup, path: &NodePath) -> Result<&'a mut Condition, RuleTreeError> {
    let (parent_path, index) = path
        .split_last()
        .ok_or_else(|| RuleTreeError::NotACondition(path.clone()))?;
    let parent =
        group_mut(root, &parent_path).map_err(|_| RuleTreeError::PathNotFound(path.clone()))?;
    match parent.rules.get_mut(index) {
        Some(RuleNode::Condition(condition)) => Ok(condition),
        Some(RuleNode::Group(_)) => Err(RuleTreeError::NotACondition(path.clone())),
        None => Err(RuleTreeError::PathNotFound(path.clone())),
    }
}
