//! Group creation, ungroup and group updates

use crate::constants::{editor, keys, sizes};
use crate::convert::{bounds_of, group_record, ViewNode};
use crate::events::CanvasEvent;
use crate::types::{FlowGroup, GroupId, GroupUpdate, NodeId, Position, Size};

use super::{fresh_id, CanvasEditor, ContextMenuKind};

impl CanvasEditor {
    /// Group the selected nodes into a fresh container
    ///
    /// Refused unless at least two non-group nodes are selected and none of
    /// them is already a group member. A selected node tagged with a legacy
    /// `_groupId` naming a live group pulls that group's members into the
    /// new group and deletes the old one.
    pub fn create_group(&mut self) -> Option<GroupId> {
        if self.read_only {
            return None;
        }

        let selected: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|n| n.selected && !n.is_group())
            .map(|n| n.id.clone())
            .collect();
        if selected.len() < 2 {
            log::warn!("Group creation needs at least two selected nodes, got {}", selected.len());
            return None;
        }
        if let Some(member) = self
            .nodes
            .iter()
            .find(|n| n.selected && !n.is_group() && n.parent_id.is_some())
        {
            log::warn!(
                "Group creation refused: node '{}' already belongs to a group",
                member.id
            );
            return None;
        }

        let mut absorbed: Vec<GroupId> = Vec::new();
        for id in &selected {
            let tag = self.node(id).and_then(ViewNode::legacy_group_tag);
            if let Some(tag) = tag {
                let live = self.node(tag).is_some_and(ViewNode::is_group);
                if live && !absorbed.iter().any(|g| g == tag) {
                    absorbed.push(tag.to_string());
                }
            }
        }

        let mut member_ids = selected;
        for old_group in &absorbed {
            for freed in self.dissolve(old_group) {
                if !member_ids.contains(&freed) {
                    member_ids.push(freed);
                }
            }
            log::info!("Merged group '{}' into a new group", old_group);
            self.emit(CanvasEvent::GroupDeleted {
                group_id: old_group.clone(),
            });
        }

        let members: Vec<&ViewNode> = self
            .nodes
            .iter()
            .filter(|n| member_ids.contains(&n.id))
            .collect();
        let any_sized = members.iter().any(|n| n.has_size_info());
        let bounds = bounds_of(members.iter().map(|n| (n.position, member_box(n, any_sized))))
            .expand(self.options.group_padding);

        let group = FlowGroup::new(fresh_id("group"), editor::NEW_GROUP_LABEL, bounds);
        let origin = bounds.origin();

        self.deselect_all();
        for node in &mut self.nodes {
            if member_ids.contains(&node.id) {
                let relative = node.position - origin;
                node.attach_to(&group.id, relative);
                node.data.remove(keys::LEGACY_GROUP_TAG);
            }
        }

        let mut container = ViewNode::from_flow_group(&group);
        container.selected = true;
        self.nodes.insert(0, container);
        self.context_menu = None;

        log::debug!(
            "Created group '{}' with {} members at ({}, {}) {}x{}",
            group.id,
            member_ids.len(),
            bounds.x,
            bounds.y,
            bounds.width,
            bounds.height
        );
        let group_id = group.id.clone();
        self.emit(CanvasEvent::GroupAdded { group });
        self.commit();
        self.report_selection();
        Some(group_id)
    }

    /// Dissolve a group, restoring each member's absolute position
    ///
    /// Returns the freed node ids.
    pub fn ungroup(&mut self, group_id: &str) -> Option<Vec<NodeId>> {
        if self.read_only {
            return None;
        }
        if !self.node(group_id).is_some_and(ViewNode::is_group) {
            return None;
        }

        let freed = self.dissolve(group_id);
        if self
            .context_menu
            .as_ref()
            .is_some_and(|m| m.target_id.as_deref() == Some(group_id))
        {
            self.context_menu = None;
        }

        self.emit(CanvasEvent::GroupUngrouped {
            group_id: group_id.to_string(),
            node_ids: freed.clone(),
        });
        self.commit();
        Some(freed)
    }

    /// Ungroup the context-menu group, or else the selected group
    pub fn ungroup_current(&mut self) -> Option<Vec<NodeId>> {
        let from_menu = self
            .context_menu
            .as_ref()
            .filter(|m| m.kind == ContextMenuKind::Group)
            .and_then(|m| m.target_id.clone());
        let target = from_menu.or_else(|| {
            self.nodes
                .iter()
                .find(|n| n.selected && n.is_group())
                .map(|n| n.id.clone())
        })?;
        self.ungroup(&target)
    }

    /// Delete a group together with its members and their edges
    pub fn delete_group(&mut self, group_id: &str) -> bool {
        if self.read_only {
            return false;
        }
        let removed = self.remove_group(group_id);
        if removed {
            self.commit();
        }
        removed
    }

    /// Apply a partial update to a group container
    pub fn update_group(&mut self, update: &GroupUpdate) -> bool {
        if self.read_only {
            return false;
        }
        let Some(node) = self.node_mut(&update.id).filter(|n| n.is_group()) else {
            return false;
        };

        if let Some(position) = update.position {
            node.position = position;
        }
        if update.width.is_some() || update.height.is_some() {
            let (w, h) = node.known_size();
            let width = update.width.or(w).unwrap_or(sizes::GROUP_FALLBACK_WIDTH);
            let height = update.height.or(h).unwrap_or(sizes::GROUP_FALLBACK_HEIGHT);
            node.width = Some(width);
            node.height = Some(height);
            if node.measured.is_some() {
                node.measured = Some(Size::new(width, height));
            }
        }
        if let Some(info) = node.group.as_mut() {
            if let Some(label) = &update.label {
                info.label = label.clone();
            }
            if let Some(style) = &update.style {
                info.style = Some(style.clone());
            }
        }

        self.emit(CanvasEvent::GroupUpdated {
            update: update.clone(),
        });
        self.commit();
        true
    }

    /// Ids of every group container, in view order
    pub fn group_ids(&self) -> Vec<GroupId> {
        self.nodes
            .iter()
            .filter(|n| n.is_group())
            .map(|n| n.id.clone())
            .collect()
    }

    /// Persisted record of one group
    pub fn group(&self, group_id: &str) -> Option<FlowGroup> {
        self.node(group_id).filter(|n| n.is_group()).map(group_record)
    }

    pub fn group_member_ids(&self, group_id: &str) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.parent_id.as_deref() == Some(group_id))
            .map(|n| n.id.clone())
            .collect()
    }

    /// Remove a group's container, members and member edges
    ///
    /// Only the group deletion is reported; members go with it.
    pub(crate) fn remove_group(&mut self, group_id: &str) -> bool {
        if !self.node(group_id).is_some_and(ViewNode::is_group) {
            return false;
        }
        let members = self.group_member_ids(group_id);

        self.nodes
            .retain(|n| n.id != group_id && !members.contains(&n.id));
        self.edges
            .retain(|e| !members.contains(&e.source) && !members.contains(&e.target));
        if self
            .last_selected
            .as_ref()
            .is_some_and(|id| members.contains(id))
        {
            self.last_selected = None;
        }

        log::debug!("Deleted group '{}' with {} members", group_id, members.len());
        self.emit(CanvasEvent::GroupDeleted {
            group_id: group_id.to_string(),
        });
        true
    }

    /// Detach every member of a group and drop its container
    fn dissolve(&mut self, group_id: &str) -> Vec<NodeId> {
        let Some(origin) = self.node(group_id).map(|g| g.position) else {
            return Vec::new();
        };

        let mut freed = Vec::new();
        for node in &mut self.nodes {
            if node.parent_id.as_deref() == Some(group_id) {
                let absolute: Position = node.position + origin;
                node.detach(absolute);
                freed.push(node.id.clone());
            }
        }
        self.nodes.retain(|n| n.id != group_id);
        freed
    }
}

/// Size a member contributes to a new group's bounds
fn member_box(node: &ViewNode, any_sized: bool) -> Size {
    if node.has_size_info() {
        let (w, h) = node.known_size();
        Size::new(
            w.unwrap_or(sizes::BOUNDS_MEMBER_WIDTH),
            h.unwrap_or(sizes::BOUNDS_MEMBER_HEIGHT),
        )
    } else if any_sized {
        Size::new(sizes::BOUNDS_MEMBER_WIDTH, sizes::BOUNDS_MEMBER_HEIGHT)
    } else {
        Size::new(sizes::APPROX_MEMBER_WIDTH, sizes::APPROX_MEMBER_HEIGHT)
    }
}
