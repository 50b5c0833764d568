//! Structure <-> view conversion
//!
//! The persisted document keeps every node position absolute and records
//! membership with `group_id`. The editor's view model nests members under
//! a group container and stores their positions relative to it. Group
//! containers themselves always keep an absolute position.
//!
//! `from_view_nodes(to_view_nodes(nodes, groups))` returns the input up to
//! floating-point equality on positions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constants::{editor, keys, sizes};
use crate::types::{
    FlowEdge, FlowGroup, FlowNode, GroupId, GroupStyle, NodeData, NodeId, Position, Rect, Size,
};

/// How a child is clamped inside its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extent {
    /// Child may not leave the parent's box
    Parent,
}

/// Label and colors carried by a group container
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<GroupStyle>,
}

/// A node as the editor sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewNode {
    pub id: NodeId,
    /// Node type, or `"group"` for group containers
    #[serde(rename = "type")]
    pub node_type: String,
    /// Relative to the parent when `parent_id` is set, absolute otherwise
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<GroupId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extent: Option<Extent>,
    /// Grow the parent when this child is dragged past its edge
    #[serde(default)]
    pub expand_parent: bool,
    pub z_index: i32,
    /// Declared size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    /// Size reported by the hosting view after layout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measured: Option<Size>,
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub draggable: bool,
    #[serde(default)]
    pub data: NodeData,
    /// Present only on group containers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupInfo>,
}

impl ViewNode {
    /// Build the view representation of a persisted node, ungrouped
    pub fn from_flow_node(node: &FlowNode) -> Self {
        Self {
            id: node.id.clone(),
            node_type: node.node_type.clone(),
            position: node.position,
            parent_id: None,
            extent: None,
            expand_parent: true,
            z_index: editor::NODE_Z_INDEX,
            width: node.width,
            height: node.height,
            measured: None,
            selected: false,
            draggable: true,
            data: node.data.clone(),
            group: None,
        }
    }

    /// Build the container view node of a persisted group
    pub fn from_flow_group(group: &FlowGroup) -> Self {
        Self {
            id: group.id.clone(),
            node_type: keys::GROUP_NODE_TYPE.to_string(),
            position: group.position,
            parent_id: None,
            extent: None,
            expand_parent: false,
            z_index: editor::GROUP_Z_INDEX,
            width: Some(group.width),
            height: Some(group.height),
            measured: None,
            selected: false,
            draggable: true,
            data: NodeData::new(),
            group: Some(GroupInfo {
                label: group.label.clone(),
                style: group.style.clone(),
            }),
        }
    }

    pub fn is_group(&self) -> bool {
        self.node_type == keys::GROUP_NODE_TYPE || self.group.is_some()
    }

    /// Attach this node to a parent container at the given relative position
    pub fn attach_to(&mut self, parent_id: &str, relative: Position) {
        self.parent_id = Some(parent_id.to_string());
        self.extent = Some(Extent::Parent);
        self.expand_parent = true;
        self.position = relative;
    }

    /// Detach from the parent container at the given absolute position
    pub fn detach(&mut self, absolute: Position) {
        self.parent_id = None;
        self.extent = None;
        self.position = absolute;
    }

    /// Measured size wins over the declared one
    pub fn known_size(&self) -> (Option<f64>, Option<f64>) {
        let measured = self.measured;
        (
            measured.map(|m| m.width).or(self.width),
            measured.map(|m| m.height).or(self.height),
        )
    }

    pub fn has_size_info(&self) -> bool {
        self.measured.is_some() || self.width.is_some() || self.height.is_some()
    }

    /// Size used for layout, with the node fallback filling any gaps
    pub fn layout_size(&self) -> Size {
        let (w, h) = self.known_size();
        Size::new(
            w.unwrap_or(sizes::NODE_FALLBACK),
            h.unwrap_or(sizes::NODE_FALLBACK),
        )
    }

    /// Legacy data tag naming an owning group
    pub fn legacy_group_tag(&self) -> Option<&str> {
        self.data.get(keys::LEGACY_GROUP_TAG).and_then(|v| v.as_str())
    }
}

/// An edge as the editor sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewEdge {
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<NodeData>,
    #[serde(default)]
    pub selected: bool,
}

/// Project persisted nodes and groups into view nodes
///
/// Group containers come first so parents precede their children.
/// A node whose `group_id` does not resolve stays ungrouped at its
/// absolute position.
pub fn to_view_nodes(nodes: &[FlowNode], groups: &[FlowGroup]) -> Vec<ViewNode> {
    let group_map: HashMap<&str, &FlowGroup> = groups.iter().map(|g| (g.id.as_str(), g)).collect();

    let mut view: Vec<ViewNode> = groups.iter().map(ViewNode::from_flow_group).collect();

    for node in nodes {
        let mut view_node = ViewNode::from_flow_node(node);
        if let Some(group_id) = node.group_id.as_deref() {
            match group_map.get(group_id) {
                Some(group) => {
                    let relative = node.position - group.position;
                    view_node.attach_to(&group.id, relative);
                }
                None => {
                    log::warn!(
                        "Node '{}' references unknown group '{}', treating as ungrouped",
                        node.id,
                        group_id
                    );
                }
            }
        }
        view.push(view_node);
    }

    view
}

/// Re-derive the persisted nodes and groups from view nodes
pub fn from_view_nodes(view: &[ViewNode]) -> (Vec<FlowNode>, Vec<FlowGroup>) {
    let group_positions: HashMap<&str, Position> = view
        .iter()
        .filter(|n| n.is_group())
        .map(|n| (n.id.as_str(), n.position))
        .collect();

    let mut nodes = Vec::new();
    let mut groups = Vec::new();

    for view_node in view {
        if view_node.is_group() {
            groups.push(group_record(view_node));
            continue;
        }

        let (position, group_id) = match view_node.parent_id.as_deref() {
            Some(parent_id) => match group_positions.get(parent_id) {
                Some(parent_pos) => (view_node.position + *parent_pos, Some(parent_id.to_string())),
                None => (view_node.position, None),
            },
            None => (view_node.position, None),
        };

        let (width, height) = view_node.known_size();
        nodes.push(FlowNode {
            id: view_node.id.clone(),
            node_type: view_node.node_type.clone(),
            position,
            data: view_node.data.clone(),
            group_id,
            width,
            height,
        });
    }

    (nodes, groups)
}

/// Persisted record of a group container
pub fn group_record(view_node: &ViewNode) -> FlowGroup {
    let (width, height) = view_node.known_size();
    let info = view_node.group.clone().unwrap_or_default();
    FlowGroup {
        id: view_node.id.clone(),
        label: if info.label.is_empty() {
            "Group".to_string()
        } else {
            info.label
        },
        position: view_node.position,
        width: width.unwrap_or(sizes::GROUP_FALLBACK_WIDTH),
        height: height.unwrap_or(sizes::GROUP_FALLBACK_HEIGHT),
        style: info.style,
    }
}

/// Absolute position of a single view node within a node set
pub fn absolute_position(view: &[ViewNode], node: &ViewNode) -> Position {
    node.parent_id
        .as_deref()
        .and_then(|pid| view.iter().find(|n| n.id == pid))
        .map(|parent| node.position + parent.position)
        .unwrap_or(node.position)
}

pub fn to_view_edges(edges: &[FlowEdge]) -> Vec<ViewEdge> {
    edges
        .iter()
        .map(|e| ViewEdge {
            id: e.id.clone(),
            source: e.source.clone(),
            target: e.target.clone(),
            source_handle: e.source_handle.clone(),
            target_handle: e.target_handle.clone(),
            data: e.data.clone(),
            selected: false,
        })
        .collect()
}

pub fn from_view_edges(edges: &[ViewEdge]) -> Vec<FlowEdge> {
    edges.iter().map(flow_edge).collect()
}

pub fn flow_edge(e: &ViewEdge) -> FlowEdge {
    FlowEdge {
        id: e.id.clone(),
        source: e.source.clone(),
        target: e.target.clone(),
        source_handle: e.source_handle.clone(),
        target_handle: e.target_handle.clone(),
        data: e.data.clone(),
    }
}

/// Union bounding box of positioned boxes
///
/// Returns an empty rectangle at the origin for an empty input.
pub fn bounds_of<I>(boxes: I) -> Rect
where
    I: IntoIterator<Item = (Position, Size)>,
{
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    let mut any = false;

    for (pos, size) in boxes {
        any = true;
        min_x = min_x.min(pos.x);
        min_y = min_y.min(pos.y);
        max_x = max_x.max(pos.x + size.width);
        max_y = max_y.max(pos.y + size.height);
    }

    if !any {
        return Rect::default();
    }

    Rect {
        x: min_x,
        y: min_y,
        width: max_x - min_x,
        height: max_y - min_y,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(id: &str, x: f64, y: f64) -> FlowGroup {
        FlowGroup::new(
            id,
            "G",
            Rect {
                x,
                y,
                width: 400.0,
                height: 300.0,
            },
        )
    }

    #[test]
    fn test_to_view_relative_positions() {
        let nodes = vec![
            FlowNode::new("a", "text", Position::new(150.0, 120.0)).with_group("g1"),
            FlowNode::new("b", "image", Position::new(500.0, 500.0)),
        ];
        let groups = vec![group("g1", 100.0, 100.0)];

        let view = to_view_nodes(&nodes, &groups);
        assert_eq!(view.len(), 3);
        // Containers come first
        assert!(view[0].is_group());
        assert_eq!(view[0].z_index, -1);

        let a = view.iter().find(|n| n.id == "a").unwrap();
        assert_eq!(a.parent_id.as_deref(), Some("g1"));
        assert_eq!(a.position, Position::new(50.0, 20.0));
        assert_eq!(a.extent, Some(Extent::Parent));
        assert!(a.expand_parent);

        let b = view.iter().find(|n| n.id == "b").unwrap();
        assert!(b.parent_id.is_none());
        assert_eq!(b.position, Position::new(500.0, 500.0));
    }

    #[test]
    fn test_dangling_group_degrades_to_ungrouped() {
        let nodes = vec![FlowNode::new("a", "text", Position::new(10.0, 10.0)).with_group("gone")];
        let view = to_view_nodes(&nodes, &[]);
        assert_eq!(view.len(), 1);
        assert!(view[0].parent_id.is_none());
        assert_eq!(view[0].position, Position::new(10.0, 10.0));

        let (back, groups) = from_view_nodes(&view);
        assert!(groups.is_empty());
        assert!(back[0].group_id.is_none());
    }

    #[test]
    fn test_round_trip() {
        let nodes = vec![
            FlowNode::new("a", "text", Position::new(150.5, 120.25))
                .with_group("g1")
                .with_size(100.0, 50.0),
            FlowNode::new("b", "image", Position::new(-30.0, 7.0)),
            FlowNode::new("c", "video", Position::new(900.0, 410.0)).with_group("g2"),
        ];
        let mut g2 = group("g2", 800.0, 400.0);
        g2.style = Some(GroupStyle {
            background_color: Some("#222".into()),
            color: None,
        });
        let groups = vec![group("g1", 100.0, 100.0), g2];

        let (back_nodes, back_groups) = from_view_nodes(&to_view_nodes(&nodes, &groups));
        assert_eq!(back_groups, groups);
        assert_eq!(back_nodes.len(), nodes.len());
        for (orig, back) in nodes.iter().zip(&back_nodes) {
            assert_eq!(orig.id, back.id);
            assert_eq!(orig.group_id, back.group_id);
            assert_eq!(orig.width, back.width);
            assert!(orig.position.approx_eq(&back.position, 1e-9));
        }
    }

    #[test]
    fn test_measured_size_wins() {
        let mut view = to_view_nodes(
            &[FlowNode::new("a", "text", Position::default()).with_size(100.0, 50.0)],
            &[group("g", 0.0, 0.0)],
        );
        view[0].measured = Some(Size::new(420.0, 333.0));
        view[1].measured = Some(Size::new(120.0, 60.0));

        let (nodes, groups) = from_view_nodes(&view);
        assert_eq!(groups[0].width, 420.0);
        assert_eq!(nodes[0].width, Some(120.0));
        assert_eq!(nodes[0].height, Some(60.0));
    }

    #[test]
    fn test_group_fallback_size() {
        let mut node = ViewNode::from_flow_group(&group("g", 0.0, 0.0));
        node.width = None;
        node.height = None;
        let record = group_record(&node);
        assert_eq!(record.width, 200.0);
        assert_eq!(record.height, 100.0);
    }

    #[test]
    fn test_bounds_of() {
        let rect = bounds_of([
            (Position::new(0.0, 0.0), Size::new(100.0, 50.0)),
            (Position::new(200.0, 10.0), Size::new(100.0, 50.0)),
        ]);
        assert_eq!(rect, Rect { x: 0.0, y: 0.0, width: 300.0, height: 60.0 });
        assert_eq!(bounds_of(std::iter::empty()), Rect::default());
    }
}
