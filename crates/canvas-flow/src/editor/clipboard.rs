//! Copy and paste of single nodes

use crate::constants::keys;
use crate::convert::ViewNode;
use crate::events::CanvasEvent;
use crate::types::NodeId;

use super::{fresh_id, CanvasEditor, ContextMenuKind};

impl CanvasEditor {
    /// Snapshot one node into the clipboard
    ///
    /// The most recently selected node wins over the context-menu target.
    /// Group containers are never copied.
    pub fn copy(&mut self) -> bool {
        let from_selection = self
            .last_selected
            .as_deref()
            .and_then(|id| self.node(id))
            .filter(|n| n.selected && !n.is_group())
            .or_else(|| self.nodes.iter().rev().find(|n| n.selected && !n.is_group()));

        let from_menu = || {
            self.context_menu
                .as_ref()
                .filter(|m| m.kind == ContextMenuKind::Node)
                .and_then(|m| m.target_id.as_deref())
                .and_then(|id| self.node(id))
                .filter(|n| !n.is_group())
        };

        let Some(source) = from_selection.or_else(from_menu).cloned() else {
            return false;
        };
        log::debug!("Copied node '{}'", source.id);
        self.clipboard = Some(source);
        self.context_menu = None;
        true
    }

    pub fn clipboard(&self) -> Option<&ViewNode> {
        self.clipboard.as_ref()
    }

    pub fn has_clipboard(&self) -> bool {
        self.clipboard.is_some()
    }

    /// Paste the clipboard node at the context-menu or pointer position
    ///
    /// The pasted node gets a fresh id, lands ungrouped and becomes the
    /// only selected node. No-op with an empty clipboard.
    pub fn paste(&mut self) -> Option<NodeId> {
        if self.read_only {
            return None;
        }
        let mut node = self.clipboard.clone()?;

        let screen = self
            .context_menu
            .as_ref()
            .map(|m| m.position)
            .unwrap_or(self.pointer);
        let position = self.screen_to_flow(screen);

        node.id = fresh_id(&node.node_type);
        node.detach(position);
        node.data.remove(keys::LEGACY_GROUP_TAG);
        node.measured = None;

        self.deselect_all();
        node.selected = true;
        let id = node.id.clone();
        self.last_selected = Some(id.clone());
        self.nodes.push(node);
        self.context_menu = None;

        if let Some(flow_node) = self.flow_node(&id) {
            self.emit(CanvasEvent::NodeAdded { node: flow_node });
        }
        self.commit();
        self.report_selection();
        Some(id)
    }
}
