//! Context menu contract and keyboard shortcuts

use serde::{Deserialize, Serialize};

use crate::convert::{absolute_position, bounds_of};
use crate::types::{NodeId, Position, Rect};

use super::CanvasEditor;

/// What a context menu was opened on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextMenuKind {
    Node,
    Edge,
    Group,
    /// Empty canvas
    Pane,
    /// The multi-selection bounding box
    Multi,
}

/// An open context menu
#[derive(Debug, Clone, PartialEq)]
pub struct ContextMenuState {
    pub kind: ContextMenuKind,
    /// Screen position the menu was opened at
    pub position: Position,
    pub target_id: Option<String>,
}

/// Right-click target reported by the hosting view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuTarget {
    Node(NodeId),
    Edge(String),
    Pane,
    Selection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MenuAction {
    CreateGroup,
    Copy,
    Paste,
    Delete,
    Ungroup,
}

impl MenuAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::CreateGroup => "Create Group",
            Self::Copy => "Copy",
            Self::Paste => "Paste",
            Self::Delete => "Delete",
            Self::Ungroup => "Ungroup",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuItem {
    pub action: MenuAction,
    pub enabled: bool,
}

/// A key press as seen by the canvas
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyInput {
    pub key: String,
    pub ctrl: bool,
    /// Cmd on macOS
    pub meta: bool,
    /// A text field has focus; shortcuts belong to it
    pub input_focused: bool,
}

impl KeyInput {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn with_meta(mut self) -> Self {
        self.meta = true;
        self
    }

    pub fn in_input(mut self) -> Self {
        self.input_focused = true;
        self
    }
}

impl CanvasEditor {
    /// Open a context menu on a target
    ///
    /// A node that is part of a multi-selection opens the selection menu.
    /// Vanished targets open nothing.
    pub fn open_context_menu(
        &mut self,
        target: MenuTarget,
        position: Position,
    ) -> Option<&ContextMenuState> {
        if self.read_only {
            return None;
        }
        let multi = self.selected_node_ids().len() >= 2;

        let (kind, target_id) = match target {
            MenuTarget::Node(id) => {
                let node = self.node(&id)?;
                let kind = if node.is_group() {
                    ContextMenuKind::Group
                } else if multi && node.selected {
                    ContextMenuKind::Multi
                } else {
                    ContextMenuKind::Node
                };
                (kind, Some(id))
            }
            MenuTarget::Edge(id) => {
                self.edge(&id)?;
                (ContextMenuKind::Edge, Some(id))
            }
            MenuTarget::Pane => (ContextMenuKind::Pane, None),
            MenuTarget::Selection if multi => (ContextMenuKind::Multi, None),
            MenuTarget::Selection => return None,
        };

        self.context_menu = Some(ContextMenuState {
            kind,
            position,
            target_id,
        });
        self.context_menu.as_ref()
    }

    pub fn context_menu(&self) -> Option<&ContextMenuState> {
        self.context_menu.as_ref()
    }

    pub fn close_context_menu(&mut self) {
        self.context_menu = None;
    }

    /// Entries of the open menu, in display order
    pub fn context_menu_items(&self) -> Vec<MenuItem> {
        use ContextMenuKind::*;

        let Some(menu) = &self.context_menu else {
            return Vec::new();
        };
        let kind = menu.kind;
        let mut items = Vec::new();

        if kind == Multi {
            items.push(MenuItem {
                action: MenuAction::CreateGroup,
                enabled: true,
            });
        }
        if matches!(kind, Node | Edge) {
            items.push(MenuItem {
                action: MenuAction::Copy,
                enabled: kind == Node,
            });
        }
        if matches!(kind, Pane | Node | Edge) {
            items.push(MenuItem {
                action: MenuAction::Paste,
                enabled: self.has_clipboard() && kind != Edge,
            });
        }
        items.push(MenuItem {
            action: MenuAction::Delete,
            enabled: true,
        });
        if kind == Group {
            items.push(MenuItem {
                action: MenuAction::Ungroup,
                enabled: true,
            });
        }

        items
    }

    /// Run a menu entry; disabled or absent entries do nothing
    pub fn invoke_menu_action(&mut self, action: MenuAction) -> bool {
        let enabled = self
            .context_menu_items()
            .iter()
            .any(|item| item.action == action && item.enabled);
        let Some(menu) = self.context_menu.clone().filter(|_| enabled) else {
            return false;
        };

        let done = match action {
            MenuAction::CreateGroup => self.create_group().is_some(),
            MenuAction::Copy => self.copy(),
            MenuAction::Paste => self.paste().is_some(),
            MenuAction::Ungroup => self.ungroup_current().is_some(),
            MenuAction::Delete => match (menu.kind, menu.target_id.as_deref()) {
                (ContextMenuKind::Node | ContextMenuKind::Group, Some(id)) => self.delete_node(id),
                (ContextMenuKind::Edge, Some(id)) => self.delete_edge(id),
                _ => self.delete_selected(),
            },
        };
        self.context_menu = None;
        done
    }

    /// Bounding box of a multi-selection, in canvas coordinates
    pub fn selection_bounds(&self) -> Option<Rect> {
        let selected: Vec<_> = self
            .nodes
            .iter()
            .filter(|n| n.selected && !n.is_group())
            .map(|n| (absolute_position(&self.nodes, n), n.layout_size()))
            .collect();
        if selected.len() < 2 {
            return None;
        }
        Some(bounds_of(selected))
    }

    /// Apply a keyboard shortcut; returns whether the key was handled
    pub fn handle_key(&mut self, input: &KeyInput) -> bool {
        if self.read_only || input.input_focused {
            return false;
        }
        let modifier = input.ctrl || input.meta;

        match (modifier, input.key.to_ascii_lowercase().as_str()) {
            (true, "c") => self.copy(),
            (true, "v") => self.paste().is_some(),
            (true, "g") => self.create_group().is_some(),
            (false, "delete" | "backspace") => self.delete_selected(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FlowBuilder;
    use crate::editor::tests::editor_with;
    use crate::types::CanvasFlowValue;

    fn sample() -> CanvasFlowValue {
        FlowBuilder::new()
            .add_group("g", (0.0, 0.0), (300.0, 200.0))
            .add_node("a", "text", (10.0, 10.0))
            .in_group("g")
            .add_node("b", "image", (400.0, 0.0))
            .with_size(100.0, 100.0)
            .add_node("c", "video", (600.0, 0.0))
            .with_size(100.0, 100.0)
            .add_edge("b", "c")
            .build()
    }

    fn actions(editor: &CanvasEditor) -> Vec<(MenuAction, bool)> {
        editor
            .context_menu_items()
            .into_iter()
            .map(|i| (i.action, i.enabled))
            .collect()
    }

    #[test]
    fn test_menu_contents_by_kind() {
        use MenuAction::*;
        let (mut editor, _) = editor_with(&sample());

        editor.open_context_menu(MenuTarget::Node("b".into()), Position::default());
        assert_eq!(actions(&editor), vec![(Copy, true), (Paste, false), (Delete, true)]);

        editor.open_context_menu(MenuTarget::Edge("e-b-c".into()), Position::default());
        assert_eq!(actions(&editor), vec![(Copy, false), (Paste, false), (Delete, true)]);

        editor.open_context_menu(MenuTarget::Node("g".into()), Position::default());
        assert_eq!(editor.context_menu().unwrap().kind, ContextMenuKind::Group);
        assert_eq!(actions(&editor), vec![(Delete, true), (Ungroup, true)]);

        editor.select(&["b"]);
        editor.copy();
        editor.open_context_menu(MenuTarget::Pane, Position::default());
        assert_eq!(actions(&editor), vec![(Paste, true), (Delete, true)]);

        editor.select(&["b", "c"]);
        editor.open_context_menu(MenuTarget::Node("c".into()), Position::default());
        assert_eq!(editor.context_menu().unwrap().kind, ContextMenuKind::Multi);
        assert_eq!(actions(&editor), vec![(CreateGroup, true), (Delete, true)]);
    }

    #[test]
    fn test_vanished_target_opens_nothing() {
        let (mut editor, _) = editor_with(&sample());
        assert!(editor
            .open_context_menu(MenuTarget::Node("ghost".into()), Position::default())
            .is_none());
        assert!(editor
            .open_context_menu(MenuTarget::Selection, Position::default())
            .is_none());
    }

    #[test]
    fn test_disabled_action_does_nothing() {
        let (mut editor, _) = editor_with(&sample());
        editor.open_context_menu(MenuTarget::Edge("e-b-c".into()), Position::default());
        assert!(!editor.invoke_menu_action(MenuAction::Copy));
        assert!(!editor.has_clipboard());

        assert!(editor.invoke_menu_action(MenuAction::Delete));
        assert!(editor.edges().is_empty());
        assert!(editor.context_menu().is_none());
    }

    #[test]
    fn test_menu_ungroup() {
        let (mut editor, sink) = editor_with(&sample());
        editor.open_context_menu(MenuTarget::Node("g".into()), Position::default());
        assert!(editor.invoke_menu_action(MenuAction::Ungroup));
        assert!(editor.group_ids().is_empty());
        assert_eq!(sink.count("groupUngrouped"), 1);
    }

    #[test]
    fn test_selection_bounds() {
        let (mut editor, _) = editor_with(&sample());
        editor.select(&["b"]);
        assert!(editor.selection_bounds().is_none());
        editor.select(&["b", "c"]);
        assert_eq!(
            editor.selection_bounds(),
            Some(Rect { x: 400.0, y: 0.0, width: 300.0, height: 100.0 })
        );
    }

    #[test]
    fn test_keyboard_shortcuts() {
        let (mut editor, _) = editor_with(&sample());
        editor.select(&["b"]);

        assert!(!editor.handle_key(&KeyInput::new("c").with_ctrl().in_input()));
        assert!(editor.handle_key(&KeyInput::new("c").with_meta()));
        assert!(editor.has_clipboard());

        editor.set_pointer(Position::new(900.0, 900.0));
        assert!(editor.handle_key(&KeyInput::new("V").with_ctrl()));
        assert_eq!(editor.nodes().len(), 5);

        editor.select(&["b", "c"]);
        assert!(editor.handle_key(&KeyInput::new("g").with_ctrl()));
        assert_eq!(editor.group_ids().len(), 2);

        // Plain "c" is not a shortcut
        assert!(!editor.handle_key(&KeyInput::new("c")));

        editor.set_read_only(true);
        assert!(!editor.handle_key(&KeyInput::new("Delete")));
        editor.set_read_only(false);

        let group_id = editor
            .nodes()
            .iter()
            .find(|n| n.is_group() && n.selected)
            .map(|n| n.id.clone())
            .unwrap();
        assert!(editor.handle_key(&KeyInput::new("Delete")));
        assert!(editor.node(&group_id).is_none());
        assert!(editor.node("b").is_none());
    }
}
