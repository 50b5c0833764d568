//! Collaborator events
//!
//! Every granular mutation, whole-flow change and execution request the
//! editor reports to its host goes through an [`EventSink`]. Hosts that
//! only care about a subset simply ignore the rest; with a
//! [`NullEventSink`] the editor works with no collaborators at all.

use serde::{Deserialize, Serialize};

use crate::types::{
    CanvasFlowValue, EdgeId, FlowEdge, FlowGroup, FlowNode, GroupId, GroupUpdate, NodeData,
    NodeExecutionStatus, NodeId,
};

/// Trait for delivering canvas events to the host
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be delivered (e.g., channel closed)
    fn send(&self, event: CanvasEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events reported to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CanvasEvent {
    /// A node was added (absolute position)
    NodeAdded { node: FlowNode },

    /// A node finished a drag (absolute position)
    NodeMoved { node: FlowNode },

    /// A node was deleted
    #[serde(rename_all = "camelCase")]
    NodeDeleted { node_id: NodeId },

    /// A node's data settled after edits (full data, not a patch)
    #[serde(rename_all = "camelCase")]
    NodeDataChanged { node_id: NodeId, data: NodeData },

    /// An edge passed validation and was added
    EdgeAdded { edge: FlowEdge },

    #[serde(rename_all = "camelCase")]
    EdgeDeleted { edge_id: EdgeId },

    GroupAdded { group: FlowGroup },

    /// A group was deleted together with its members
    #[serde(rename_all = "camelCase")]
    GroupDeleted { group_id: GroupId },

    /// A group was dissolved; its members survive ungrouped
    #[serde(rename_all = "camelCase")]
    GroupUngrouped {
        group_id: GroupId,
        node_ids: Vec<NodeId>,
    },

    /// A group was moved or resized
    GroupUpdated { update: GroupUpdate },

    /// The host asked to save a group as a standalone flow
    #[serde(rename_all = "camelCase")]
    GroupSaved {
        group_id: GroupId,
        flow: CanvasFlowValue,
    },

    /// Fired on every committed structural change
    FlowChanged { flow: CanvasFlowValue },

    /// Selected node ids, group containers excluded
    #[serde(rename_all = "camelCase")]
    SelectionChanged { node_ids: Vec<NodeId> },

    /// A full run was requested
    FlowRunRequested { flow: CanvasFlowValue },

    #[serde(rename_all = "camelCase")]
    NodeStatusChanged {
        node_id: NodeId,
        status: NodeExecutionStatus,
    },
}

impl CanvasEvent {
    /// Short name used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NodeAdded { .. } => "nodeAdded",
            Self::NodeMoved { .. } => "nodeMoved",
            Self::NodeDeleted { .. } => "nodeDeleted",
            Self::NodeDataChanged { .. } => "nodeDataChanged",
            Self::EdgeAdded { .. } => "edgeAdded",
            Self::EdgeDeleted { .. } => "edgeDeleted",
            Self::GroupAdded { .. } => "groupAdded",
            Self::GroupDeleted { .. } => "groupDeleted",
            Self::GroupUngrouped { .. } => "groupUngrouped",
            Self::GroupUpdated { .. } => "groupUpdated",
            Self::GroupSaved { .. } => "groupSaved",
            Self::FlowChanged { .. } => "flowChanged",
            Self::SelectionChanged { .. } => "selectionChanged",
            Self::FlowRunRequested { .. } => "flowRunRequested",
            Self::NodeStatusChanged { .. } => "nodeStatusChanged",
        }
    }
}

/// Send an event, logging instead of failing when delivery is refused
pub fn dispatch(sink: &dyn EventSink, event: CanvasEvent) {
    let kind = event.kind();
    if let Err(e) = sink.send(event) {
        log::warn!("Dropped '{}' event: {}", kind, e);
    }
}

/// A no-op event sink that discards all events
///
/// Useful for testing or when events aren't needed.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: CanvasEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecEventSink {
    events: parking_lot::Mutex<Vec<CanvasEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<CanvasEvent> {
        self.events.lock().clone()
    }

    /// Names of the collected events, in order
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(CanvasEvent::kind).collect()
    }

    /// Count collected events of one kind
    pub fn count(&self, kind: &str) -> usize {
        self.events.lock().iter().filter(|e| e.kind() == kind).count()
    }

    /// Remove and return the collected events
    pub fn take(&self) -> Vec<CanvasEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: CanvasEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Closure-backed sink for hosts that route events through a callback
pub struct CallbackEventSink {
    callback: Box<dyn Fn(CanvasEvent) + Send + Sync>,
}

impl CallbackEventSink {
    pub fn new(callback: impl Fn(CanvasEvent) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl EventSink for CallbackEventSink {
    fn send(&self, event: CanvasEvent) -> Result<(), EventError> {
        (self.callback)(event);
        Ok(())
    }
}

/// Sink backed by a tokio unbounded channel
pub struct ChannelEventSink {
    sender: tokio::sync::mpsc::UnboundedSender<CanvasEvent>,
}

impl ChannelEventSink {
    pub fn new(sender: tokio::sync::mpsc::UnboundedSender<CanvasEvent>) -> Self {
        Self { sender }
    }
}

impl EventSink for ChannelEventSink {
    fn send(&self, event: CanvasEvent) -> Result<(), EventError> {
        self.sender
            .send(event)
            .map_err(|_| EventError::channel_closed())
    }
}
