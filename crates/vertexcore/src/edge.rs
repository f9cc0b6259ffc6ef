use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

use crate::VertexId;

/// Unconditional edge marker.
pub const ALWAYS: EdgeType = EdgeType::Always;

/// Conventional positive branch.
pub const CONDITION_TRUE: EdgeType = EdgeType::Condition(Cow::Borrowed("true"));

/// Conventional negative branch.
pub const CONDITION_FALSE: EdgeType = EdgeType::Condition(Cow::Borrowed("false"));

/// Why an edge may be traversed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EdgeType {
    /// Traversed whenever the source vertex completes.
    #[default]
    Always,
    /// Traversed only when the source vertex selected the branch with this id.
    Condition(Cow<'static, str>),
}

impl EdgeType {
    pub fn always() -> Self {
        EdgeType::Always
    }

    pub fn condition(id: impl Into<String>) -> Self {
        EdgeType::Condition(Cow::Owned(id.into()))
    }

    /// `Condition("true")`.
    pub fn default_condition() -> Self {
        CONDITION_TRUE
    }

    pub fn condition_id(&self) -> Option<&str> {
        match self {
            EdgeType::Always => None,
            EdgeType::Condition(id) => Some(&**id),
        }
    }

    /// Whether an edge of this type is traversable given the branch the
    /// source vertex evaluated to.
    pub fn is_satisfied_by(&self, branch: Option<&str>) -> bool {
        match self {
            EdgeType::Always => true,
            EdgeType::Condition(id) => branch == Some(&**id),
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeType::Always => write!(f, "always"),
            EdgeType::Condition(id) => write!(f, "condition({})", id),
        }
    }
}

/// Directed, typed connection between two vertices.
///
/// Endpoints are vertex ids; the edge never owns the vertices it joins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: VertexId,
    pub target: VertexId,
    #[serde(rename = "type", default)]
    pub edge_type: EdgeType,
}

impl Edge {
    pub fn new(source: impl Into<VertexId>, target: impl Into<VertexId>, edge_type: EdgeType) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            edge_type,
        }
    }

    pub fn always(source: impl Into<VertexId>, target: impl Into<VertexId>) -> Self {
        Self::new(source, target, EdgeType::Always)
    }

    pub fn when(
        source: impl Into<VertexId>,
        target: impl Into<VertexId>,
        branch: impl Into<String>,
    ) -> Self {
        Self::new(source, target, EdgeType::condition(branch))
    }

    pub fn source(&self) -> &VertexId {
        &self.source
    }

    pub fn target(&self) -> &VertexId {
        &self.target
    }

    pub fn edge_type(&self) -> &EdgeType {
        &self.edge_type
    }

    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}->{}", self.source, self.edge_type, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    #[test]
    fn test_always_equal() {
        assert_eq!(EdgeType::always(), EdgeType::Always);
        assert_eq!(EdgeType::always(), ALWAYS);
    }

    #[test]
    fn test_condition_equality_by_id() {
        assert_eq!(EdgeType::condition("true"), CONDITION_TRUE);
        assert_eq!(EdgeType::condition("false"), CONDITION_FALSE);
        assert_ne!(EdgeType::condition("true"), EdgeType::condition("false"));
        assert_ne!(EdgeType::condition("true"), EdgeType::Always);
        assert_eq!(EdgeType::default_condition(), EdgeType::condition("true"));
    }

    #[test]
    fn test_edge_type_as_map_key() {
        let mut counts: HashMap<EdgeType, usize> = HashMap::new();
        *counts.entry(EdgeType::condition("true")).or_default() += 1;
        *counts.entry(CONDITION_TRUE).or_default() += 1;
        *counts.entry(ALWAYS).or_default() += 1;

        assert_eq!(counts.len(), 2);
        assert_eq!(counts[&CONDITION_TRUE], 2);
    }

    #[test]
    fn test_edge_structural_equality() {
        let a = Edge::new("llm", "out", EdgeType::condition("true"));
        let b = Edge::new("llm", "out", CONDITION_TRUE);
        let c = Edge::new("llm", "out", CONDITION_FALSE);

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<Edge> = [a.clone(), b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert!(set.contains(&a));
    }

    #[test]
    fn test_edge_accessors_and_display() {
        let edge = Edge::always("a", "b");
        assert_eq!(edge.source(), "a");
        assert_eq!(edge.target(), "b");
        assert_eq!(edge.edge_type(), &ALWAYS);
        assert_eq!(edge.to_string(), "a->always->b");
        assert_eq!(Edge::when("a", "c", "false").to_string(), "a->condition(false)->c");
    }

    #[test]
    fn test_self_loop_representable() {
        let edge = Edge::always("loop", "loop");
        assert!(edge.is_self_loop());
    }

    #[test]
    fn test_satisfied_by_branch() {
        assert!(ALWAYS.is_satisfied_by(None));
        assert!(ALWAYS.is_satisfied_by(Some("false")));
        assert!(CONDITION_TRUE.is_satisfied_by(Some("true")));
        assert!(!CONDITION_TRUE.is_satisfied_by(Some("false")));
        assert!(!CONDITION_TRUE.is_satisfied_by(None));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let edge = Edge::when("check", "yes", "true");
        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "source": "check",
                "target": "yes",
                "type": {"kind": "condition", "id": "true"}
            })
        );

        let parsed: Edge = serde_json::from_value(serde_json::json!({
            "source": "a",
            "target": "b"
        }))
        .unwrap();
        assert_eq!(parsed, Edge::always("a", "b"));
    }
}
