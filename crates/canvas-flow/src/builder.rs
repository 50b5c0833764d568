//! Fluent builder for structure documents
//!
//! Provides a fluent API for constructing canvas flows programmatically.

use serde_json::Value;

use crate::types::{
    CanvasFlowValue, FlowEdge, FlowGroup, FlowMeta, FlowNode, GroupStyle, Position, Rect, Size,
};

/// Fluent builder for constructing canvas flows
///
/// Node positions are absolute, as in the persisted document.
///
/// # Example
///
/// ```ignore
/// let flow = FlowBuilder::new()
///     .add_group("g1", (0.0, 0.0), (600.0, 300.0))
///     .add_node("prompt", "text", (20.0, 20.0))
///     .in_group("g1")
///     .with_data(serde_json::json!({"text": "A red fox"}))
///     .add_node("render", "image", (320.0, 20.0))
///     .add_edge("prompt", "render")
///     .build();
/// ```
#[derive(Default)]
pub struct FlowBuilder {
    nodes: Vec<FlowNode>,
    edges: Vec<FlowEdge>,
    groups: Vec<FlowGroup>,
    meta: Option<FlowMeta>,
}

impl FlowBuilder {
    /// Create an empty flow builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the flow
    pub fn add_node(
        mut self,
        id: impl Into<String>,
        node_type: impl Into<String>,
        position: (f64, f64),
    ) -> Self {
        self.nodes
            .push(FlowNode::new(id, node_type, Position::new(position.0, position.1)));
        self
    }

    /// Set data on the most recently added node
    ///
    /// Must be called immediately after `add_node`. Non-object values are ignored.
    pub fn with_data(mut self, data: Value) -> Self {
        if let (Some(node), Value::Object(map)) = (self.nodes.last_mut(), data) {
            node.data = map;
        }
        self
    }

    /// Set the declared size of the most recently added node
    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.width = Some(width);
            node.height = Some(height);
        }
        self
    }

    /// Put the most recently added node into a group
    pub fn in_group(mut self, group_id: impl Into<String>) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.group_id = Some(group_id.into());
        }
        self
    }

    /// Add a group container
    pub fn add_group(
        mut self,
        id: impl Into<String>,
        position: (f64, f64),
        size: (f64, f64),
    ) -> Self {
        let bounds = Rect::from_origin_size(
            Position::new(position.0, position.1),
            Size::new(size.0, size.1),
        );
        self.groups.push(FlowGroup::new(id, "Group", bounds));
        self
    }

    /// Set the label of the most recently added group
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        if let Some(group) = self.groups.last_mut() {
            group.label = label.into();
        }
        self
    }

    /// Set the style of the most recently added group
    pub fn with_style(mut self, style: GroupStyle) -> Self {
        if let Some(group) = self.groups.last_mut() {
            group.style = Some(style);
        }
        self
    }

    /// Add an edge with the conventional `e-{source}-{target}` id
    pub fn add_edge(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.edges.push(FlowEdge::between(source, target));
        self
    }

    /// Add an edge with explicit handles
    pub fn add_edge_with_handles(
        mut self,
        source: impl Into<String>,
        source_handle: impl Into<String>,
        target: impl Into<String>,
        target_handle: impl Into<String>,
    ) -> Self {
        let mut edge = FlowEdge::between(source, target);
        edge.source_handle = Some(source_handle.into());
        edge.target_handle = Some(target_handle.into());
        self.edges.push(edge);
        self
    }

    /// Set the document name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.meta.get_or_insert_with(FlowMeta::default).name = Some(name.into());
        self
    }

    /// Build the flow without validation
    pub fn build(self) -> CanvasFlowValue {
        CanvasFlowValue {
            nodes: self.nodes,
            edges: self.edges,
            groups: self.groups,
            meta: self.meta,
        }
    }
}
