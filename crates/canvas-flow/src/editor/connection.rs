//! Connection gestures
//!
//! A connection dragged from a handle and dropped on another node becomes
//! an edge if both the DAG check and the type rules accept it. Dropped on
//! empty canvas, it opens a menu offering only the node types the rules
//! allow in the gesture's direction; picking one creates the node and the
//! edge together.

use serde::{Deserialize, Serialize};

use crate::config::NodeDefinition;
use crate::convert::ViewEdge;
use crate::events::CanvasEvent;
use crate::types::{EdgeId, NodeId, Position, Size};
use crate::validation::{check_connection, is_connection_allowed, Connection};

use super::CanvasEditor;

/// Which side of a node a connection drag started from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleType {
    /// Output handle; a node created from the drag becomes downstream
    Source,
    /// Input handle; a node created from the drag becomes upstream
    Target,
}

/// An in-progress connection drag
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionDrag {
    pub node_id: NodeId,
    pub handle_type: HandleType,
    pub handle_id: Option<String>,
}

/// Node-type menu opened over empty canvas
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionMenu {
    /// Screen position the menu was opened at
    pub position: Position,
    /// The drag that opened it; `None` for a pane double-click
    pub origin: Option<ConnectionDrag>,
}

impl CanvasEditor {
    /// Add an edge if it passes validation
    ///
    /// Rejected connections leave no trace: no edge, no event.
    pub fn connect(&mut self, connection: Connection) -> Option<EdgeId> {
        if self.read_only {
            return None;
        }
        let id = self.try_add_edge(connection)?;
        self.commit();
        Some(id)
    }

    pub(crate) fn try_add_edge(&mut self, connection: Connection) -> Option<EdgeId> {
        if let Err(rejection) = check_connection(&self.config, &self.nodes, &self.edges, &connection)
        {
            log::debug!(
                "Rejected connection {} -> {}: {}",
                connection.source,
                connection.target,
                rejection
            );
            return None;
        }

        let id = format!("e-{}-{}", connection.source, connection.target);
        if self.edge(&id).is_some() {
            return None;
        }

        let edge = ViewEdge {
            id: id.clone(),
            source: connection.source,
            target: connection.target,
            source_handle: connection.source_handle,
            target_handle: connection.target_handle,
            data: None,
            selected: false,
        };
        self.emit(CanvasEvent::EdgeAdded {
            edge: crate::convert::flow_edge(&edge),
        });
        self.edges.push(edge);
        Some(id)
    }

    /// A connection drag started on a node's handle
    pub fn on_connect_start(
        &mut self,
        node_id: &str,
        handle_type: HandleType,
        handle_id: Option<String>,
    ) {
        if self.read_only || self.node(node_id).is_none() {
            return;
        }
        self.connection_drag = Some(ConnectionDrag {
            node_id: node_id.to_string(),
            handle_type,
            handle_id,
        });
    }

    /// A connection drag ended
    ///
    /// Released over empty canvas, it opens the connection menu at the
    /// drop point. Returns whether the menu opened.
    pub fn on_connect_end(&mut self, screen: Position, over_pane: bool) -> bool {
        let Some(drag) = self.connection_drag.take() else {
            return false;
        };
        if !over_pane {
            return false;
        }
        self.connection_menu = Some(ConnectionMenu {
            position: screen,
            origin: Some(drag),
        });
        true
    }

    /// Open the node-type menu without a pending connection
    pub fn open_node_menu(&mut self, screen: Position) {
        if self.read_only {
            return;
        }
        self.connection_menu = Some(ConnectionMenu {
            position: screen,
            origin: None,
        });
    }

    pub fn connection_menu(&self) -> Option<&ConnectionMenu> {
        self.connection_menu.as_ref()
    }

    pub fn close_connection_menu(&mut self) {
        self.connection_menu = None;
    }

    /// Node types the open menu offers
    ///
    /// Without a pending connection every configured type is offered.
    pub fn available_node_types(&self) -> Vec<&NodeDefinition> {
        let all = self.config.node_definitions.iter();
        let Some(origin) = self.connection_menu.as_ref().and_then(|m| m.origin.as_ref()) else {
            return all.collect();
        };
        let Some(origin_type) = self.node(&origin.node_id).map(|n| n.node_type.as_str()) else {
            return all.collect();
        };

        all.filter(|def| match origin.handle_type {
            HandleType::Source => is_connection_allowed(&self.config, origin_type, &def.node_type),
            HandleType::Target => is_connection_allowed(&self.config, &def.node_type, origin_type),
        })
        .collect()
    }

    /// Create a node from the open menu, wiring it to the drag origin
    pub fn add_node_from_menu(&mut self, node_type: &str) -> Option<NodeId> {
        if self.read_only {
            return None;
        }
        let menu = self.connection_menu.take()?;

        let position = self.screen_to_flow(menu.position) - self.options.drop_offset;
        let size = self
            .config
            .definition(node_type)
            .map(|def| {
                Size::new(
                    def.width.unwrap_or(self.options.default_node_size.width),
                    def.height.unwrap_or(self.options.default_node_size.height),
                )
            })
            .unwrap_or(self.options.default_node_size);

        let id = self.insert_node(node_type, position, Some(size));

        if let Some(origin) = menu.origin {
            let connection = match origin.handle_type {
                HandleType::Source => Connection {
                    source: origin.node_id,
                    target: id.clone(),
                    source_handle: origin.handle_id,
                    target_handle: None,
                },
                HandleType::Target => Connection {
                    source: id.clone(),
                    target: origin.node_id,
                    source_handle: None,
                    target_handle: origin.handle_id,
                },
            };
            self.try_add_edge(connection);
        }

        self.commit();
        Some(id)
    }
}
