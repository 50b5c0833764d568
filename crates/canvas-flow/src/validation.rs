//! Connection and document validation
//!
//! Two pure predicates guard every new edge: the DAG check (no self loops,
//! no cycles) and the per-type connection rules declared in the canvas
//! configuration. Both must pass; evaluation order does not matter.
//!
//! `validate_flow` is a separate whole-document audit for documents that
//! arrive from outside the editor.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::config::CanvasConfig;
use crate::convert::{ViewEdge, ViewNode};
use crate::types::{CanvasFlowValue, FlowEdge};

/// Anything with a source and a target node
pub trait EdgeEndpoints {
    fn source(&self) -> &str;
    fn target(&self) -> &str;
}

impl EdgeEndpoints for FlowEdge {
    fn source(&self) -> &str {
        &self.source
    }
    fn target(&self) -> &str {
        &self.target
    }
}

impl EdgeEndpoints for ViewEdge {
    fn source(&self) -> &str {
        &self.source
    }
    fn target(&self) -> &str {
        &self.target
    }
}

impl EdgeEndpoints for Connection {
    fn source(&self) -> &str {
        &self.source
    }
    fn target(&self) -> &str {
        &self.target
    }
}

/// A proposed edge
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

impl Connection {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
        }
    }
}

/// Check that adding `candidate` keeps the edge set acyclic
///
/// Existing edges are assumed acyclic (every prior edge passed this same
/// check), so it is enough to search for a path from the candidate's
/// target back to its source.
pub fn is_acyclic<'a, E, C>(
    node_ids: impl IntoIterator<Item = &'a str>,
    edges: &[E],
    candidate: &C,
) -> bool
where
    E: EdgeEndpoints,
    C: EdgeEndpoints + ?Sized,
{
    let source = candidate.source();
    let target = candidate.target();
    if source == target {
        return false;
    }

    let mut adjacency: HashMap<&str, Vec<&str>> =
        node_ids.into_iter().map(|id| (id, Vec::new())).collect();
    for edge in edges {
        adjacency.entry(edge.source()).or_default().push(edge.target());
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack = vec![target];

    while let Some(current) = stack.pop() {
        if current == source {
            return false;
        }
        if visited.insert(current) {
            if let Some(neighbors) = adjacency.get(current) {
                stack.extend(neighbors.iter().copied());
            }
        }
    }

    true
}

/// Check the per-type allow-lists for a `source_type -> target_type` edge
///
/// Types unknown to the configuration are permitted.
pub fn is_connection_allowed(config: &CanvasConfig, source_type: &str, target_type: &str) -> bool {
    let (Some(source_def), Some(target_def)) =
        (config.definition(source_type), config.definition(target_type))
    else {
        return true;
    };

    if let Some(targets) = source_def.allowed_targets() {
        if !targets.iter().any(|t| t == target_type) {
            return false;
        }
    }

    if let Some(sources) = target_def.allowed_sources() {
        if !sources.iter().any(|s| s == source_type) {
            return false;
        }
    }

    true
}

/// Why a proposed connection was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionRejection {
    /// Source and target are the same node
    SelfLoop,
    /// An endpoint is not present in the editor
    MissingEndpoint(String),
    /// The type allow-lists forbid this pairing
    RuleViolation {
        source_type: String,
        target_type: String,
    },
    /// The edge would close a cycle
    Cycle,
}

impl std::fmt::Display for ConnectionRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SelfLoop => write!(f, "Connection from a node to itself"),
            Self::MissingEndpoint(id) => write!(f, "Connection endpoint '{}' does not exist", id),
            Self::RuleViolation {
                source_type,
                target_type,
            } => write!(f, "'{}' may not connect to '{}'", source_type, target_type),
            Self::Cycle => write!(f, "Connection would create a cycle"),
        }
    }
}

/// Run both connection checks against the editor's view state
pub fn check_connection(
    config: &CanvasConfig,
    nodes: &[ViewNode],
    edges: &[ViewEdge],
    connection: &Connection,
) -> std::result::Result<(), ConnectionRejection> {
    if connection.source == connection.target {
        return Err(ConnectionRejection::SelfLoop);
    }

    let find = |id: &str| nodes.iter().find(|n| n.id == id && !n.is_group());
    let source = find(&connection.source)
        .ok_or_else(|| ConnectionRejection::MissingEndpoint(connection.source.clone()))?;
    let target = find(&connection.target)
        .ok_or_else(|| ConnectionRejection::MissingEndpoint(connection.target.clone()))?;

    if !is_acyclic(nodes.iter().map(|n| n.id.as_str()), edges, connection) {
        return Err(ConnectionRejection::Cycle);
    }

    if !is_connection_allowed(config, &source.node_type, &target.node_type) {
        return Err(ConnectionRejection::RuleViolation {
            source_type: source.node_type.clone(),
            target_type: target.node_type.clone(),
        });
    }

    Ok(())
}

/// Validation error with location context
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Cycle detected in the graph
    CycleDetected,
    /// An edge references a non-existent node
    UnknownNode { edge_id: String, node_id: String },
    /// An edge connects a node to itself
    SelfLoop { edge_id: String },
    /// A node references a group that does not exist
    DanglingGroup { node_id: String, group_id: String },
    /// The same id is used by more than one node, group or edge
    DuplicateId { id: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CycleDetected => write!(f, "Cycle detected in graph"),
            Self::UnknownNode { edge_id, node_id } => {
                write!(f, "Edge '{}' references unknown node '{}'", edge_id, node_id)
            }
            Self::SelfLoop { edge_id } => write!(f, "Edge '{}' connects a node to itself", edge_id),
            Self::DanglingGroup { node_id, group_id } => {
                write!(f, "Node '{}' references unknown group '{}'", node_id, group_id)
            }
            Self::DuplicateId { id } => write!(f, "Id '{}' is used more than once", id),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a structure document
///
/// Returns all validation errors found (not just the first).
pub fn validate_flow(flow: &CanvasFlowValue) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    validate_unique_ids(flow, &mut errors);
    validate_edge_references(flow, &mut errors);
    validate_group_references(flow, &mut errors);
    detect_cycles(flow, &mut errors);

    errors
}

fn validate_unique_ids(flow: &CanvasFlowValue, errors: &mut Vec<ValidationError>) {
    let mut seen: HashSet<&str> = HashSet::new();
    let ids = flow
        .nodes
        .iter()
        .map(|n| n.id.as_str())
        .chain(flow.groups.iter().map(|g| g.id.as_str()));
    for id in ids {
        if !seen.insert(id) {
            errors.push(ValidationError::DuplicateId { id: id.to_string() });
        }
    }

    let mut seen_edges: HashSet<&str> = HashSet::new();
    for edge in &flow.edges {
        if !seen_edges.insert(edge.id.as_str()) {
            errors.push(ValidationError::DuplicateId {
                id: edge.id.clone(),
            });
        }
    }
}

/// Check that all edge source/target nodes exist
fn validate_edge_references(flow: &CanvasFlowValue, errors: &mut Vec<ValidationError>) {
    let node_ids: HashSet<&str> = flow.nodes.iter().map(|n| n.id.as_str()).collect();

    for edge in &flow.edges {
        if edge.source == edge.target {
            errors.push(ValidationError::SelfLoop {
                edge_id: edge.id.clone(),
            });
        }
        for endpoint in [&edge.source, &edge.target] {
            if !node_ids.contains(endpoint.as_str()) {
                errors.push(ValidationError::UnknownNode {
                    edge_id: edge.id.clone(),
                    node_id: endpoint.clone(),
                });
            }
        }
    }
}

fn validate_group_references(flow: &CanvasFlowValue, errors: &mut Vec<ValidationError>) {
    let group_ids: HashSet<&str> = flow.groups.iter().map(|g| g.id.as_str()).collect();

    for node in &flow.nodes {
        if let Some(group_id) = &node.group_id {
            if !group_ids.contains(group_id.as_str()) {
                errors.push(ValidationError::DanglingGroup {
                    node_id: node.id.clone(),
                    group_id: group_id.clone(),
                });
            }
        }
    }
}

/// Detect cycles using Kahn's algorithm (topological sort)
fn detect_cycles(flow: &CanvasFlowValue, errors: &mut Vec<ValidationError>) {
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    for node in &flow.nodes {
        in_degree.insert(&node.id, 0);
    }
    for edge in &flow.edges {
        if in_degree.contains_key(edge.source.as_str()) {
            if let Some(deg) = in_degree.get_mut(edge.target.as_str()) {
                *deg += 1;
            }
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut visited = 0;
    while let Some(node_id) = queue.pop_front() {
        visited += 1;
        for edge in &flow.edges {
            if edge.source == node_id {
                if let Some(deg) = in_degree.get_mut(edge.target.as_str()) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(&edge.target);
                    }
                }
            }
        }
    }

    if visited < in_degree.len() {
        errors.push(ValidationError::CycleDetected);
    }
}
