//! Graph mutation engine
//!
//! `CanvasEditor` owns the live view state of one editing session: view
//! nodes (members positioned relative to their group container), view
//! edges, selection, clipboard and gesture state. Every mutation is
//! local, optimistic and non-transactional. Gestures against ids that are
//! no longer present are ignored, since they can race with `set_flow`.
//!
//! The operations are split by concern:
//! - this module: nodes, edges, selection, drag and delete
//! - [`groups`]: group creation, ungroup and group updates
//! - [`clipboard`]: copy and paste
//! - [`connection`]: connection gestures and drag-to-create
//! - [`context_menu`]: context menu contents and keyboard shortcuts

mod clipboard;
mod connection;
mod context_menu;
mod groups;

pub use connection::{ConnectionDrag, ConnectionMenu, HandleType};
pub use context_menu::{ContextMenuKind, ContextMenuState, KeyInput, MenuAction, MenuItem, MenuTarget};

use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::config::{CanvasConfig, EditorOptions};
use crate::convert::{
    absolute_position, from_view_edges, from_view_nodes, group_record, to_view_edges,
    to_view_nodes, Extent, ViewEdge, ViewNode,
};
use crate::events::{dispatch, CanvasEvent, EventSink, NullEventSink};
use crate::types::{
    CanvasFlowValue, FlowMeta, FlowNode, GroupUpdate, NodeData, NodeId, Position, Size,
};
use crate::viewport::Viewport;

/// Live editing state for one canvas
pub struct CanvasEditor {
    config: Arc<CanvasConfig>,
    options: EditorOptions,
    sink: Arc<dyn EventSink>,
    nodes: Vec<ViewNode>,
    edges: Vec<ViewEdge>,
    meta: Option<FlowMeta>,
    clipboard: Option<ViewNode>,
    viewport: Viewport,
    view_size: Size,
    /// Last known pointer position, in screen coordinates
    pointer: Position,
    context_menu: Option<ContextMenuState>,
    connection_drag: Option<ConnectionDrag>,
    connection_menu: Option<ConnectionMenu>,
    /// Most recently selected non-group node
    last_selected: Option<NodeId>,
    read_only: bool,
    revision: u64,
}

impl CanvasEditor {
    /// Create an editor with no collaborators attached
    pub fn new(config: Arc<CanvasConfig>) -> Self {
        Self::with_sink(config, Arc::new(NullEventSink))
    }

    pub fn with_sink(config: Arc<CanvasConfig>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            options: EditorOptions::default(),
            sink,
            nodes: Vec::new(),
            edges: Vec::new(),
            meta: None,
            clipboard: None,
            viewport: Viewport::default(),
            view_size: Size::default(),
            pointer: Position::default(),
            context_menu: None,
            connection_drag: None,
            connection_menu: None,
            last_selected: None,
            read_only: false,
            revision: 0,
        }
    }

    pub fn with_options(mut self, options: EditorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    pub fn options(&self) -> &EditorOptions {
        &self.options
    }

    // -------------------------------------------------------------------------
    // Structure
    // -------------------------------------------------------------------------

    /// Replace the view state with a projection of `flow`
    ///
    /// Does not report a change; the host already has this structure.
    pub fn set_flow(&mut self, flow: &CanvasFlowValue) {
        self.nodes = to_view_nodes(&flow.nodes, &flow.groups);
        self.edges = to_view_edges(&flow.edges);
        self.meta = flow.meta.clone();
        self.context_menu = None;
        self.connection_drag = None;
        self.connection_menu = None;
        if let Some(id) = &self.last_selected {
            if self.node(id).is_none() {
                self.last_selected = None;
            }
        }
        log::debug!(
            "Editor loaded {} view nodes and {} edges",
            self.nodes.len(),
            self.edges.len()
        );
    }

    /// Re-derive the persisted structure from the view state
    pub fn get_flow(&self) -> CanvasFlowValue {
        let (nodes, groups) = from_view_nodes(&self.nodes);
        CanvasFlowValue {
            nodes,
            edges: from_view_edges(&self.edges),
            groups,
            meta: self.meta.clone(),
        }
    }

    /// Number of committed structural changes so far
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn nodes(&self) -> &[ViewNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[ViewEdge] {
        &self.edges
    }

    pub fn node(&self, id: &str) -> Option<&ViewNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub(crate) fn node_mut(&mut self, id: &str) -> Option<&mut ViewNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&ViewEdge> {
        self.edges.iter().find(|e| e.id == id)
    }

    /// Persisted form of one node (absolute position)
    pub fn flow_node(&self, id: &str) -> Option<FlowNode> {
        let view_node = self.node(id).filter(|n| !n.is_group())?;
        let (width, height) = view_node.known_size();
        Some(FlowNode {
            id: view_node.id.clone(),
            node_type: view_node.node_type.clone(),
            position: absolute_position(&self.nodes, view_node),
            data: view_node.data.clone(),
            group_id: view_node
                .parent_id
                .clone()
                .filter(|pid| self.node(pid).is_some()),
            width,
            height,
        })
    }

    // -------------------------------------------------------------------------
    // View
    // -------------------------------------------------------------------------

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Replace the viewport; the zoom is clamped to the allowed range
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = Viewport::new(viewport.x, viewport.y, viewport.zoom);
    }

    /// Size of the hosting view in screen pixels
    pub fn set_view_size(&mut self, size: Size) {
        self.view_size = size;
    }

    pub fn view_size(&self) -> Size {
        self.view_size
    }

    /// Track the pointer (screen coordinates)
    pub fn set_pointer(&mut self, screen: Position) {
        self.pointer = screen;
    }

    pub fn screen_to_flow(&self, screen: Position) -> Position {
        self.viewport.screen_to_flow(screen)
    }

    /// Fit the viewport around every node
    pub fn fit_view(&mut self) -> Viewport {
        let boxes: Vec<(Position, Size)> = self
            .nodes
            .iter()
            .map(|n| (absolute_position(&self.nodes, n), n.layout_size()))
            .collect();
        if !boxes.is_empty() {
            let bounds = crate::convert::bounds_of(boxes);
            self.viewport = Viewport::fit(bounds, self.view_size);
        }
        self.viewport
    }

    /// Record the size the hosting view laid a node out at
    pub fn set_measured(&mut self, id: &str, size: Size) {
        if let Some(node) = self.node_mut(id) {
            node.measured = Some(size);
        }
    }

    // -------------------------------------------------------------------------
    // Nodes and edges
    // -------------------------------------------------------------------------

    /// Add a node of `node_type` at a canvas position
    pub fn add_node(&mut self, node_type: &str, position: Position) -> Option<NodeId> {
        if self.read_only {
            return None;
        }
        let id = self.insert_node(node_type, position, None);
        self.commit();
        Some(id)
    }

    /// Add a node at a screen position (palette drop)
    pub fn add_node_at_screen(&mut self, node_type: &str, screen: Position) -> Option<NodeId> {
        let position = self.screen_to_flow(screen);
        self.add_node(node_type, position)
    }

    /// Create a view node with the type's defaults and report it
    pub(crate) fn insert_node(
        &mut self,
        node_type: &str,
        position: Position,
        size: Option<Size>,
    ) -> NodeId {
        let id = fresh_id(node_type);
        let mut flow_node = FlowNode::new(&id, node_type, position)
            .with_data(self.config.initial_data(node_type));
        match size {
            Some(size) => {
                flow_node.width = Some(size.width);
                flow_node.height = Some(size.height);
            }
            None => {
                if let Some(def) = self.config.definition(node_type) {
                    flow_node.width = def.width;
                    flow_node.height = def.height;
                }
            }
        }

        self.nodes.push(ViewNode::from_flow_node(&flow_node));
        log::debug!("Added node '{}' of type '{}'", id, node_type);
        self.emit(CanvasEvent::NodeAdded { node: flow_node });
        id
    }

    /// Merge a patch into a node's data, returning the full data
    ///
    /// Only the view state changes here; reporting the change to the host
    /// is left to the caller (the session debounces it).
    pub fn update_node_data(&mut self, id: &str, patch: &NodeData) -> Option<NodeData> {
        if self.read_only {
            return None;
        }
        let node = self.node_mut(id).filter(|n| !n.is_group())?;
        for (key, value) in patch {
            node.data.insert(key.clone(), value.clone());
        }
        Some(node.data.clone())
    }

    /// Delete a node (or a group, with its members) and its incident edges
    pub fn delete_node(&mut self, id: &str) -> bool {
        if self.read_only {
            return false;
        }
        let Some(is_group) = self.node(id).map(ViewNode::is_group) else {
            return false;
        };
        let removed = if is_group {
            self.remove_group(id)
        } else {
            self.remove_node(id)
        };
        if removed {
            self.commit();
        }
        removed
    }

    pub fn delete_edge(&mut self, id: &str) -> bool {
        if self.read_only {
            return false;
        }
        let removed = self.remove_edge(id);
        if removed {
            self.commit();
        }
        removed
    }

    /// Delete every selected group, node and edge
    pub fn delete_selected(&mut self) -> bool {
        if self.read_only {
            return false;
        }
        let groups: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|n| n.selected && n.is_group())
            .map(|n| n.id.clone())
            .collect();
        let mut removed = false;
        for group_id in &groups {
            removed |= self.remove_group(group_id);
        }

        let nodes: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|n| n.selected && !n.is_group())
            .map(|n| n.id.clone())
            .collect();
        for node_id in &nodes {
            removed |= self.remove_node(node_id);
        }

        let edges: Vec<String> = self
            .edges
            .iter()
            .filter(|e| e.selected)
            .map(|e| e.id.clone())
            .collect();
        for edge_id in &edges {
            removed |= self.remove_edge(edge_id);
        }

        if removed {
            self.commit();
        }
        removed
    }

    fn remove_node(&mut self, id: &str) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|n| n.id != id);
        if self.nodes.len() == before {
            return false;
        }
        self.edges.retain(|e| e.source != id && e.target != id);
        self.forget_selection_of(id);
        self.emit(CanvasEvent::NodeDeleted {
            node_id: id.to_string(),
        });
        true
    }

    fn remove_edge(&mut self, id: &str) -> bool {
        let before = self.edges.len();
        self.edges.retain(|e| e.id != id);
        if self.edges.len() == before {
            return false;
        }
        self.emit(CanvasEvent::EdgeDeleted {
            edge_id: id.to_string(),
        });
        true
    }

    // -------------------------------------------------------------------------
    // Drag
    // -------------------------------------------------------------------------

    /// Move a node during a drag
    ///
    /// `position` is in the node's own frame (relative for members). A
    /// member is kept inside its parent; with `expand_parent` the parent
    /// grows instead of clamping the far edges.
    pub fn drag(&mut self, id: &str, position: Position) {
        if self.read_only {
            return;
        }
        let Some(index) = self.nodes.iter().position(|n| n.id == id) else {
            return;
        };

        let node = &self.nodes[index];
        let parent_index = match (&node.parent_id, node.extent) {
            (Some(pid), Some(Extent::Parent)) => self.nodes.iter().position(|n| &n.id == pid),
            _ => None,
        };

        let Some(parent_index) = parent_index else {
            self.nodes[index].position = position;
            return;
        };

        let child_size = self.nodes[index].layout_size();
        let expand = self.nodes[index].expand_parent;
        let parent = &mut self.nodes[parent_index];
        let parent_size = parent.known_size();
        let parent_w = parent_size.0.unwrap_or(0.0);
        let parent_h = parent_size.1.unwrap_or(0.0);

        let mut clamped = Position::new(position.x.max(0.0), position.y.max(0.0));
        if expand {
            let needed_w = clamped.x + child_size.width;
            let needed_h = clamped.y + child_size.height;
            if needed_w > parent_w || needed_h > parent_h {
                let grown = Size::new(parent_w.max(needed_w), parent_h.max(needed_h));
                log::debug!(
                    "Group '{}' expanded to {}x{}",
                    parent.id,
                    grown.width,
                    grown.height
                );
                parent.measured = Some(grown);
            }
        } else {
            clamped.x = clamped.x.min((parent_w - child_size.width).max(0.0));
            clamped.y = clamped.y.min((parent_h - child_size.height).max(0.0));
        }

        self.nodes[index].position = clamped;
    }

    /// Report the outcome of a finished drag
    pub fn drag_stop(&mut self, id: &str) {
        if self.read_only {
            return;
        }
        let Some(node) = self.node(id) else {
            log::debug!("Drag stop on vanished node '{}' ignored", id);
            return;
        };

        if node.is_group() {
            let record = group_record(node);
            self.emit(CanvasEvent::GroupUpdated {
                update: GroupUpdate {
                    id: record.id,
                    position: Some(record.position),
                    width: Some(record.width),
                    height: Some(record.height),
                    ..Default::default()
                },
            });
        } else {
            let parent_update = node
                .parent_id
                .as_deref()
                .and_then(|pid| self.node(pid))
                .and_then(|parent| {
                    parent.measured.map(|m| GroupUpdate {
                        id: parent.id.clone(),
                        width: Some(m.width),
                        height: Some(m.height),
                        ..Default::default()
                    })
                });
            if let Some(flow_node) = self.flow_node(id) {
                log::debug!(
                    "Node '{}' moved to ({}, {})",
                    id,
                    flow_node.position.x,
                    flow_node.position.y
                );
                self.emit(CanvasEvent::NodeMoved { node: flow_node });
            }
            if let Some(update) = parent_update {
                self.emit(CanvasEvent::GroupUpdated { update });
            }
        }

        self.commit();
    }

    // -------------------------------------------------------------------------
    // Selection
    // -------------------------------------------------------------------------

    /// Replace the node selection
    pub fn select(&mut self, ids: &[&str]) {
        let wanted: HashSet<&str> = ids.iter().copied().collect();
        for node in &mut self.nodes {
            node.selected = wanted.contains(node.id.as_str());
        }
        for edge in &mut self.edges {
            edge.selected = false;
        }
        if let Some(last) = ids
            .iter()
            .rev()
            .find(|id| self.node(id).is_some_and(|n| !n.is_group()))
        {
            self.last_selected = Some(last.to_string());
        }
        self.report_selection();
    }

    /// Add to or remove from the selection
    pub fn toggle_selected(&mut self, id: &str) {
        let Some(node) = self.node_mut(id) else {
            return;
        };
        node.selected = !node.selected;
        if node.selected && !node.is_group() {
            self.last_selected = Some(id.to_string());
        }
        self.report_selection();
    }

    /// Replace the edge selection
    pub fn select_edges(&mut self, ids: &[&str]) {
        for edge in &mut self.edges {
            edge.selected = ids.contains(&edge.id.as_str());
        }
    }

    pub fn clear_selection(&mut self) {
        self.select(&[]);
    }

    /// Selected node ids, group containers excluded
    pub fn selected_node_ids(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.selected && !n.is_group())
            .map(|n| n.id.clone())
            .collect()
    }

    /// The node whose property panel is shown: the only selected node
    pub fn inspecting_node(&self) -> Option<&ViewNode> {
        let mut selected = self.nodes.iter().filter(|n| n.selected && !n.is_group());
        match (selected.next(), selected.next()) {
            (Some(node), None) => Some(node),
            _ => None,
        }
    }

    pub(crate) fn deselect_all(&mut self) {
        for node in &mut self.nodes {
            node.selected = false;
        }
        for edge in &mut self.edges {
            edge.selected = false;
        }
    }

    pub(crate) fn report_selection(&self) {
        self.emit(CanvasEvent::SelectionChanged {
            node_ids: self.selected_node_ids(),
        });
    }

    fn forget_selection_of(&mut self, id: &str) {
        if self.last_selected.as_deref() == Some(id) {
            self.last_selected = None;
        }
    }

    // -------------------------------------------------------------------------
    // Plumbing
    // -------------------------------------------------------------------------

    pub(crate) fn emit(&self, event: CanvasEvent) {
        dispatch(self.sink.as_ref(), event);
    }

    /// Record a structural change and report the new structure
    pub(crate) fn commit(&mut self) {
        self.revision += 1;
        log::debug!("Editor commit #{}", self.revision);
        let flow = self.get_flow();
        self.emit(CanvasEvent::FlowChanged { flow });
    }
}

/// Fresh id for a node of the given type
pub(crate) fn fresh_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}
