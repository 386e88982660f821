//! Segment rule tree data model
//!
//! A rule tree is a single root [`RuleGroup`] whose children are either leaf
//! [`Condition`]s or nested groups. Every node is addressed by a [`NodePath`],
//! the sequence of zero-based child indices leading to it from the root.
//!
//! The wire shape is:
//!
//! ```text
//! Group     := { "operator": "AND" | "OR", "rules": [Condition | Group] }
//! Condition := { "field": string, "operator": string, "value": string | number }
//! ```
//!
//! A group is told apart from a condition by the presence of a `rules` member.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Fields and operators
// ============================================================================

/// Customer attribute a condition tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Field {
    #[default]
    #[serde(rename = "totalSpend", alias = "Total Spend", alias = "total_spend")]
    TotalSpend,
    #[serde(rename = "visitCount", alias = "Visit Count", alias = "visit_count")]
    VisitCount,
    #[serde(
        rename = "lastPurchase",
        alias = "Last Purchase",
        alias = "Last Purchase Date",
        alias = "last_purchase"
    )]
    LastPurchase,
}

/// Value kind expected by a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Numeric,
    Date,
}

const NUMERIC_OPERATORS: &[ConditionOperator] = &[
    ConditionOperator::GreaterThan,
    ConditionOperator::LessThan,
    ConditionOperator::Equals,
    ConditionOperator::NotEquals,
];

const DATE_OPERATORS: &[ConditionOperator] = &[
    ConditionOperator::Before,
    ConditionOperator::After,
    ConditionOperator::Equals,
];

impl Field {
    /// All fields in display order
    pub const ALL: [Field; 3] = [Field::TotalSpend, Field::VisitCount, Field::LastPurchase];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::TotalSpend => "totalSpend",
            Field::VisitCount => "visitCount",
            Field::LastPurchase => "lastPurchase",
        }
    }

    /// Human readable label
    pub fn label(&self) -> &'static str {
        match self {
            Field::TotalSpend => "Total Spend",
            Field::VisitCount => "Visit Count",
            Field::LastPurchase => "Last Purchase",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Field::TotalSpend | Field::VisitCount => FieldKind::Numeric,
            Field::LastPurchase => FieldKind::Date,
        }
    }

    /// Operators valid for this field, default first
    pub fn allowed_operators(&self) -> &'static [ConditionOperator] {
        match self.kind() {
            FieldKind::Numeric => NUMERIC_OPERATORS,
            FieldKind::Date => DATE_OPERATORS,
        }
    }

    pub fn default_operator(&self) -> ConditionOperator {
        self.allowed_operators()[0]
    }

    pub fn allows(&self, operator: ConditionOperator) -> bool {
        self.allowed_operators().contains(&operator)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FieldKind {
    /// Whether a value can be stored on a condition of this kind.
    ///
    /// The empty string is the unset value and fits every kind.
    pub fn accepts(&self, value: &RuleValue) -> bool {
        if value.is_empty() {
            return true;
        }
        match self {
            FieldKind::Numeric => value.as_f64().is_some(),
            FieldKind::Date => value.as_date().is_some(),
        }
    }
}

/// Comparison operator of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionOperator {
    #[serde(rename = "greaterThan", alias = "gt", alias = "greater_than")]
    GreaterThan,
    #[serde(rename = "lessThan", alias = "lt", alias = "less_than")]
    LessThan,
    #[serde(rename = "equals", alias = "eq")]
    Equals,
    #[serde(rename = "notEquals", alias = "neq", alias = "not_equals")]
    NotEquals,
    #[serde(rename = "before")]
    Before,
    #[serde(rename = "after")]
    After,
}

impl ConditionOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionOperator::GreaterThan => "greaterThan",
            ConditionOperator::LessThan => "lessThan",
            ConditionOperator::Equals => "equals",
            ConditionOperator::NotEquals => "notEquals",
            ConditionOperator::Before => "before",
            ConditionOperator::After => "after",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConditionOperator::GreaterThan => "greater than",
            ConditionOperator::LessThan => "less than",
            ConditionOperator::Equals => "equals",
            ConditionOperator::NotEquals => "not equals",
            ConditionOperator::Before => "before",
            ConditionOperator::After => "after",
        }
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boolean connective of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum GroupOperator {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

impl GroupOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupOperator::And => "AND",
            GroupOperator::Or => "OR",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            GroupOperator::And => GroupOperator::Or,
            GroupOperator::Or => GroupOperator::And,
        }
    }
}

impl fmt::Display for GroupOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Values
// ============================================================================

/// Scalar compared by a condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleValue {
    Number(serde_json::Number),
    Text(String),
}

impl Default for RuleValue {
    fn default() -> Self {
        RuleValue::Text(String::new())
    }
}

impl RuleValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, RuleValue::Text(s) if s.trim().is_empty())
    }

    /// Numeric reading of the value (numbers and numeric strings)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RuleValue::Number(n) => n.as_f64(),
            RuleValue::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        }
    }

    /// Calendar date reading of the value (`YYYY-MM-DD` or RFC 3339)
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            RuleValue::Number(_) => None,
            RuleValue::Text(s) => {
                let s = s.trim();
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
            }
        }
    }
}

impl fmt::Display for RuleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleValue::Number(n) => write!(f, "{}", n),
            RuleValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for RuleValue {
    fn from(value: &str) -> Self {
        RuleValue::Text(value.to_string())
    }
}

impl From<String> for RuleValue {
    fn from(value: String) -> Self {
        RuleValue::Text(value)
    }
}

impl From<i64> for RuleValue {
    fn from(value: i64) -> Self {
        RuleValue::Number(value.into())
    }
}

impl From<u64> for RuleValue {
    fn from(value: u64) -> Self {
        RuleValue::Number(value.into())
    }
}

// ============================================================================
// Paths
// ============================================================================

/// Address of a node: zero-based child indices from the root group
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    /// Number of steps from the root
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Path of the `index`-th child of this node
    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    /// Parent path and this node's index within the parent; `None` for the root
    pub fn split_last(&self) -> Option<(NodePath, usize)> {
        self.0
            .split_last()
            .map(|(last, parent)| (NodePath(parent.to_vec()), *last))
    }

    /// Whether `other` lies strictly below this node
    pub fn is_ancestor_of(&self, other: &NodePath) -> bool {
        other.0.len() > self.0.len() && other.0.starts_with(&self.0)
    }

    /// Where this path points once the node at `removed` is gone.
    ///
    /// `None` when this node was removed itself or sat inside the removed subtree.
    pub fn after_removal(&self, removed: &NodePath) -> Option<NodePath> {
        let (parent, index) = removed.split_last()?;
        if self == removed || removed.is_ancestor_of(self) {
            return None;
        }
        let depth = parent.depth();
        if parent.is_ancestor_of(self) && self.0[depth] > index {
            let mut indices = self.0.clone();
            indices[depth] -= 1;
            return Some(NodePath(indices));
        }
        Some(self.clone())
    }
}

impl From<Vec<usize>> for NodePath {
    fn from(indices: Vec<usize>) -> Self {
        Self(indices)
    }
}

impl From<&[usize]> for NodePath {
    fn from(indices: &[usize]) -> Self {
        Self(indices.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for NodePath {
    fn from(indices: [usize; N]) -> Self {
        Self(indices.to_vec())
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("root");
        }
        let parts: Vec<String> = self.0.iter().map(|i| i.to_string()).collect();
        f.write_str(&parts.join("."))
    }
}

/// Error parsing a textual node path
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid node path `{0}`")]
pub struct ParsePathError(pub String);

impl FromStr for NodePath {
    type Err = ParsePathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == "root" {
            return Ok(NodePath::root());
        }
        s.split('.')
            .map(|part| part.trim().parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .map(NodePath)
            .map_err(|_| ParsePathError(s.to_string()))
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Contract violations of tree operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleTreeError {
    #[error("no node at path {0}")]
    PathNotFound(NodePath),

    #[error("node at {0} is not a group")]
    NotAGroup(NodePath),

    #[error("node at {0} is not a condition")]
    NotACondition(NodePath),

    #[error("the root group cannot be removed")]
    RootNotRemovable,

    #[error("operator `{operator}` is not allowed for field `{field}`")]
    OperatorNotAllowed {
        field: Field,
        operator: ConditionOperator,
    },

    #[error("value `{value}` does not fit field `{field}`")]
    ValueKindMismatch { field: Field, value: String },
}

/// A JSON document that does not follow the rule tree grammar
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("rule tree root must be a group")]
    RootNotGroup,

    #[error("node at {0} is not a JSON object")]
    NotAnObject(NodePath),

    #[error("group at {0} has a `rules` member that is not an array")]
    RulesNotArray(NodePath),

    #[error("node at {path}: {message}")]
    Malformed { path: NodePath, message: String },

    #[error("condition at {path}: {source}")]
    InvalidCondition {
        path: NodePath,
        #[source]
        source: RuleTreeError,
    },
}

// ============================================================================
// Nodes
// ============================================================================

/// Leaf predicate over one customer attribute.
///
/// The operator always belongs to the field's allowed set and the value always
/// fits the field's kind; every constructor and update path enforces this.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    field: Field,
    operator: ConditionOperator,
    value: RuleValue,
}

impl Condition {
    pub fn new(
        field: Field,
        operator: ConditionOperator,
        value: impl Into<RuleValue>,
    ) -> Result<Self, RuleTreeError> {
        if !field.allows(operator) {
            return Err(RuleTreeError::OperatorNotAllowed { field, operator });
        }
        let value = value.into();
        if !field.kind().accepts(&value) {
            return Err(RuleTreeError::ValueKindMismatch {
                field,
                value: value.to_string(),
            });
        }
        Ok(Self {
            field,
            operator,
            value,
        })
    }

    /// Default condition for a field: its default operator and an empty value
    pub fn for_field(field: Field) -> Self {
        Self {
            field,
            operator: field.default_operator(),
            value: RuleValue::default(),
        }
    }

    pub fn field(&self) -> Field {
        self.field
    }

    pub fn operator(&self) -> ConditionOperator {
        self.operator
    }

    pub fn value(&self) -> &RuleValue {
        &self.value
    }

    pub(crate) fn set_field(&mut self, field: Field) {
        if field.kind() != self.field.kind() {
            self.value = RuleValue::default();
        }
        if !field.allows(self.operator) {
            self.operator = field.default_operator();
        }
        self.field = field;
    }

    pub(crate) fn set_operator(&mut self, operator: ConditionOperator) -> Result<(), RuleTreeError> {
        if !self.field.allows(operator) {
            return Err(RuleTreeError::OperatorNotAllowed {
                field: self.field,
                operator,
            });
        }
        self.operator = operator;
        Ok(())
    }

    pub(crate) fn set_value(&mut self, value: RuleValue) -> Result<(), RuleTreeError> {
        if !self.field.kind().accepts(&value) {
            return Err(RuleTreeError::ValueKindMismatch {
                field: self.field,
                value: value.to_string(),
            });
        }
        self.value = value;
        Ok(())
    }
}

impl Default for Condition {
    fn default() -> Self {
        Self::for_field(Field::default())
    }
}

/// Internal node combining its children with one connective
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct RuleGroup {
    pub operator: GroupOperator,
    pub rules: Vec<RuleNode>,
}

impl RuleGroup {
    pub fn new(operator: GroupOperator, rules: Vec<RuleNode>) -> Self {
        Self { operator, rules }
    }
}

/// Child of a group
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RuleNode {
    Group(RuleGroup),
    Condition(Condition),
}

impl From<Condition> for RuleNode {
    fn from(condition: Condition) -> Self {
        RuleNode::Condition(condition)
    }
}

impl From<RuleGroup> for RuleNode {
    fn from(group: RuleGroup) -> Self {
        RuleNode::Group(group)
    }
}

/// Borrowed view of any node, root included
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeRef<'a> {
    Group(&'a RuleGroup),
    Condition(&'a Condition),
}

impl<'a> From<&'a RuleNode> for NodeRef<'a> {
    fn from(node: &'a RuleNode) -> Self {
        match node {
            RuleNode::Group(group) => NodeRef::Group(group),
            RuleNode::Condition(condition) => NodeRef::Condition(condition),
        }
    }
}

// ============================================================================
// Tree
// ============================================================================

/// Full membership predicate of a segment; the root is always a group
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuleTree {
    root: RuleGroup,
}

impl RuleTree {
    /// A tree holding one empty AND group
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_root(root: RuleGroup) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &RuleGroup {
        &self.root
    }

    pub(crate) fn root_mut(&mut self) -> &mut RuleGroup {
        &mut self.root
    }

    /// Node addressed by `path`, if the path is valid for this tree
    pub fn node_at(&self, path: &NodePath) -> Option<NodeRef<'_>> {
        let mut current = NodeRef::Group(&self.root);
        for &index in path.indices() {
            current = match current {
                NodeRef::Group(group) => NodeRef::from(group.rules.get(index)?),
                NodeRef::Condition(_) => return None,
            };
        }
        Some(current)
    }

    pub fn group_at(&self, path: &NodePath) -> Option<&RuleGroup> {
        match self.node_at(path)? {
            NodeRef::Group(group) => Some(group),
            NodeRef::Condition(_) => None,
        }
    }

    pub fn condition_at(&self, path: &NodePath) -> Option<&Condition> {
        match self.node_at(path)? {
            NodeRef::Condition(condition) => Some(condition),
            NodeRef::Group(_) => None,
        }
    }

    /// Pre-order traversal of every node with its path, root first
    pub fn walk(&self) -> Vec<(NodePath, NodeRef<'_>)> {
        fn visit<'a>(group: &'a RuleGroup, path: NodePath, out: &mut Vec<(NodePath, NodeRef<'a>)>) {
            out.push((path.clone(), NodeRef::Group(group)));
            for (index, child) in group.rules.iter().enumerate() {
                match child {
                    RuleNode::Group(nested) => visit(nested, path.child(index), out),
                    RuleNode::Condition(condition) => {
                        out.push((path.child(index), NodeRef::Condition(condition)))
                    }
                }
            }
        }

        let mut out = Vec::new();
        visit(&self.root, NodePath::root(), &mut out);
        out
    }

    /// Number of nodes, root included
    pub fn node_count(&self) -> usize {
        self.walk().len()
    }

    pub fn condition_count(&self) -> usize {
        self.walk()
            .iter()
            .filter(|(_, node)| matches!(node, NodeRef::Condition(_)))
            .count()
    }

    /// Length of the longest path (0 for a lone root)
    pub fn depth(&self) -> usize {
        self.walk()
            .iter()
            .map(|(path, _)| path.depth())
            .max()
            .unwrap_or(0)
    }

    /// Parse a JSON document into a tree, checking the grammar
    pub fn from_value(value: &serde_json::Value) -> Result<Self, ShapeError> {
        match parse_node(value, NodePath::root())? {
            RuleNode::Group(root) => Ok(Self { root }),
            RuleNode::Condition(_) => Err(ShapeError::RootNotGroup),
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(&self.root).unwrap_or(serde_json::Value::Null)
    }
}

fn parse_node(value: &serde_json::Value, path: NodePath) -> Result<RuleNode, ShapeError> {
    let object = value
        .as_object()
        .ok_or_else(|| ShapeError::NotAnObject(path.clone()))?;

    if let Some(rules) = object.get("rules") {
        let rules = rules
            .as_array()
            .ok_or_else(|| ShapeError::RulesNotArray(path.clone()))?;
        let operator = object
            .get("operator")
            .ok_or_else(|| ShapeError::Malformed {
                path: path.clone(),
                message: "missing field `operator`".to_string(),
            })
            .and_then(|op| {
                serde_json::from_value::<GroupOperator>(op.clone()).map_err(|e| {
                    ShapeError::Malformed {
                        path: path.clone(),
                        message: e.to_string(),
                    }
                })
            })?;
        let children = rules
            .iter()
            .enumerate()
            .map(|(index, child)| parse_node(child, path.child(index)))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(RuleNode::Group(RuleGroup::new(operator, children)));
    }

    let raw: RawCondition =
        serde_json::from_value(value.clone()).map_err(|e| ShapeError::Malformed {
            path: path.clone(),
            message: e.to_string(),
        })?;
    let condition = Condition::new(raw.field, raw.operator, raw.value)
        .map_err(|source| ShapeError::InvalidCondition { path, source })?;
    Ok(RuleNode::Condition(condition))
}

#[derive(Deserialize)]
struct RawCondition {
    field: Field,
    operator: ConditionOperator,
    value: RuleValue,
}

impl Serialize for RuleTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.root.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RuleTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        RuleTree::from_value(&value).map_err(serde::de::Error::custom)
    }
}
