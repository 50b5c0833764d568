//! Editor session
//!
//! `CanvasSession` is the host-facing facade. It owns the canonical
//! structure document, the editor, the media store and the flow runner,
//! and exposes the imperative control surface: get/set flow, runs,
//! fit-view, node lookups and the media API.
//!
//! The canonical structure is re-synced from the editor after every
//! edit, so `get_flow` always reflects committed view state. Editor
//! events are held until the editor lock is released and the structure
//! is synced, so host callbacks may call back into the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::{CanvasConfig, SessionOptions};
use crate::constants::keys;
use crate::debounce::Debouncer;
use crate::editor::CanvasEditor;
use crate::error::{CanvasFlowError, Result};
use crate::events::{dispatch, CanvasEvent, EventSink, NullEventSink, VecEventSink};
use crate::media::{MediaHandler, MediaRecord, MediaSlot, MediaStore};
use crate::runner::{ExecutionConfig, FlowRunOutcome, FlowRunner};
use crate::types::{
    CanvasFlowValue, FlowNode, GroupId, GroupUpdate, NodeData, NodeExecutionStatus, NodeId,
    UpstreamNode,
};
use crate::viewport::Viewport;

/// Host hook for running a single node
#[async_trait]
pub trait NodeRunHandler: Send + Sync {
    async fn run_node(&self, node_id: &str) -> Result<()>;
}

/// Host hook for running a group; replaces the built-in group run
#[async_trait]
pub trait GroupRunHandler: Send + Sync {
    async fn run_group(&self, group_id: &str) -> Result<()>;
}

/// Produces the property panel of the inspected node
pub trait InspectorRenderer: Send + Sync {
    fn render(&self, node_id: &str, node: &FlowNode) -> Value;
}

/// Optional host hooks
#[derive(Clone, Default)]
pub struct SessionHooks {
    pub node_run: Option<Arc<dyn NodeRunHandler>>,
    pub group_run: Option<Arc<dyn GroupRunHandler>>,
    pub inspector: Option<Arc<dyn InspectorRenderer>>,
}

impl SessionHooks {
    pub fn with_node_run(mut self, handler: Arc<dyn NodeRunHandler>) -> Self {
        self.node_run = Some(handler);
        self
    }

    pub fn with_group_run(mut self, handler: Arc<dyn GroupRunHandler>) -> Self {
        self.group_run = Some(handler);
        self
    }

    pub fn with_inspector(mut self, renderer: Arc<dyn InspectorRenderer>) -> Self {
        self.inspector = Some(renderer);
        self
    }
}

/// Actions raised from a group container's toolbar
#[derive(Debug, Clone, PartialEq)]
pub enum GroupAction {
    /// Group the current selection
    Create,
    Delete(GroupId),
    Update(GroupUpdate),
    Move(GroupUpdate),
    Ungroup(GroupId),
    Run(GroupId),
    Save(GroupId),
}

/// Clears a busy flag when dropped
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Clears the running-node slot when dropped
struct NodeSlotGuard<'a>(&'a Mutex<Option<NodeId>>);

impl Drop for NodeSlotGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

/// One editing session over one canvas
pub struct CanvasSession {
    id: RwLock<String>,
    config: Arc<CanvasConfig>,
    options: SessionOptions,
    sink: Arc<dyn EventSink>,
    /// Events the editor raised, waiting for the editor lock to drop
    outbox: Arc<VecEventSink>,
    editor: Mutex<CanvasEditor>,
    flow: RwLock<CanvasFlowValue>,
    media: MediaStore,
    runner: FlowRunner,
    hooks: SessionHooks,
    data_changes: Debouncer<NodeId>,
    running: AtomicBool,
    running_node: Mutex<Option<NodeId>>,
}

impl CanvasSession {
    pub fn new(config: impl Into<Arc<CanvasConfig>>) -> Self {
        let config = config.into();
        let options = SessionOptions::default();
        let outbox = Arc::new(VecEventSink::new());
        Self {
            id: RwLock::new(String::new()),
            editor: Mutex::new(make_editor(&config, &options, &outbox)),
            data_changes: Debouncer::new(options.debounce),
            config,
            options,
            sink: Arc::new(NullEventSink),
            outbox,
            flow: RwLock::new(CanvasFlowValue::new()),
            media: MediaStore::new(),
            runner: FlowRunner::new(ExecutionConfig::default()),
            hooks: SessionHooks::default(),
            running: AtomicBool::new(false),
            running_node: Mutex::new(None),
        }
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.data_changes = Debouncer::new(options.debounce);
        self.options = options;
        self.rebuild_editor();
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_execution(mut self, execution: ExecutionConfig) -> Self {
        self.runner = FlowRunner::new(execution);
        self
    }

    pub fn with_hooks(mut self, hooks: SessionHooks) -> Self {
        self.hooks = hooks;
        self
    }

    fn rebuild_editor(&mut self) {
        let flow = self.flow.read().clone();
        let mut editor = make_editor(&self.config, &self.options, &self.outbox);
        editor.set_flow(&flow);
        self.editor = Mutex::new(editor);
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Canvas id assigned by `init`
    pub fn id(&self) -> String {
        self.id.read().clone()
    }

    // -------------------------------------------------------------------------
    // Structure
    // -------------------------------------------------------------------------

    /// Assign the canvas id and optionally load a structure
    ///
    /// Returns the id (generated when none is given).
    pub fn init(&self, initial: Option<CanvasFlowValue>, flow_id: Option<String>) -> String {
        let id = flow_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        *self.id.write() = id.clone();

        if let Some(flow) = initial {
            self.set_flow(flow);
            self.fit_view();
        }
        log::info!("Canvas session '{}' initialized", id);
        id
    }

    pub fn get_flow(&self) -> CanvasFlowValue {
        self.flow.read().clone()
    }

    /// Replace the structure; the editor rebuilds its view state
    pub fn set_flow(&self, flow: CanvasFlowValue) {
        self.editor.lock().set_flow(&flow);
        *self.flow.write() = flow;
    }

    /// Run an editor operation, re-syncing the structure if it committed
    ///
    /// Events raised by `f` reach the host after the structure is synced.
    pub fn edit<R>(&self, f: impl FnOnce(&mut CanvasEditor) -> R) -> R {
        let (result, committed) = {
            let mut editor = self.editor.lock();
            let before = editor.revision();
            let result = f(&mut editor);
            let committed = (editor.revision() != before).then(|| editor.get_flow());
            (result, committed)
        };
        if let Some(flow) = committed {
            *self.flow.write() = flow;
        }
        self.flush_events();
        result
    }

    fn flush_events(&self) {
        for event in self.outbox.take() {
            self.emit(event);
        }
    }

    /// Merge a data patch into a node now, report it once edits settle
    ///
    /// The host sees a single `NodeDataChanged` with the full data after
    /// the debounce interval.
    pub fn update_node_data(&self, node_id: &str, patch: &NodeData) -> Option<NodeData> {
        let data = {
            let mut editor = self.editor.lock();
            let data = editor.update_node_data(node_id, patch)?;
            if let Some(node) = self.flow.write().find_node_mut(node_id) {
                node.data = data.clone();
            }
            data
        };

        let sink = Arc::clone(&self.sink);
        let id = node_id.to_string();
        let full = data.clone();
        self.data_changes.call(id.clone(), move || {
            dispatch(
                sink.as_ref(),
                CanvasEvent::NodeDataChanged {
                    node_id: id,
                    data: full,
                },
            );
        });
        Some(data)
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.editor.lock().set_read_only(read_only);
    }

    pub fn is_read_only(&self) -> bool {
        self.editor.lock().is_read_only()
    }

    pub fn fit_view(&self) -> Viewport {
        self.editor.lock().fit_view()
    }

    pub fn get_viewport(&self) -> Viewport {
        self.editor.lock().viewport()
    }

    pub fn get_node(&self, node_id: &str) -> Option<FlowNode> {
        self.flow.read().find_node(node_id).cloned()
    }

    /// One-hop upstream nodes, with their live media as data
    pub fn get_upstream_nodes(&self, node_id: &str) -> Vec<UpstreamNode> {
        let flow = self.flow.read();
        flow.upstream_nodes(node_id)
            .into_iter()
            .map(|node| UpstreamNode {
                id: node.id.clone(),
                node_type: node.node_type.clone(),
                label: self.config.label_for(&node.node_type).to_string(),
                position: node.position,
                data: self.media.get(&node.id),
            })
            .collect()
    }

    /// Id of the node whose panel is shown
    pub fn inspecting_node_id(&self) -> Option<NodeId> {
        self.editor.lock().inspecting_node().map(|n| n.id.clone())
    }

    /// Render the inspected node's panel through the host renderer
    pub fn render_inspector(&self) -> Option<Value> {
        let renderer = self.hooks.inspector.as_ref()?;
        let node_id = self.inspecting_node_id()?;
        let node = self.get_node(&node_id)?;
        Some(renderer.render(&node_id, &node))
    }

    // -------------------------------------------------------------------------
    // Execution
    // -------------------------------------------------------------------------

    /// A run or a single-node run is in flight
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) || self.running_node.lock().is_some()
    }

    pub fn running_node_id(&self) -> Option<NodeId> {
        self.running_node.lock().clone()
    }

    /// Run the whole structure
    ///
    /// A second run while one is in flight is refused with `Busy`.
    pub async fn run_flow(&self) -> Result<FlowRunOutcome> {
        let _guard = self.begin_run()?;
        let flow = self.get_flow();
        self.emit(CanvasEvent::FlowRunRequested { flow: flow.clone() });

        let result = self
            .runner
            .run_flow(&flow, |node_id, status| self.report_status(node_id, status))
            .await;
        match &result {
            Ok(_) => log::info!("Flow run finished ({} nodes)", flow.nodes.len()),
            Err(e) => log::error!("Flow run failed: {}", e),
        }
        result
    }

    /// Run the members of one group
    ///
    /// Defers to the host's group-run hook when installed. Returns `None`
    /// when the hook handled it or the group has no members.
    pub async fn run_group(&self, group_id: &str) -> Result<Option<FlowRunOutcome>> {
        let _guard = self.begin_run()?;

        if let Some(hook) = &self.hooks.group_run {
            return match hook.run_group(group_id).await {
                Ok(()) => Ok(None),
                Err(e) => {
                    log::error!("Group '{}' run failed: {}", group_id, e);
                    Err(e)
                }
            };
        }

        let Some(sub_flow) = group_run_flow(&self.flow.read(), group_id) else {
            log::debug!("Group '{}' has no members to run", group_id);
            return Ok(None);
        };

        let result = self
            .runner
            .run_flow(&sub_flow, |node_id, status| self.report_status(node_id, status))
            .await;
        match result {
            Ok(outcome) => Ok(Some(outcome)),
            Err(e) => {
                log::error!("Group '{}' run failed: {}", group_id, e);
                Err(e)
            }
        }
    }

    /// Run one node through the host's node-run hook
    pub async fn run_node(&self, node_id: &str) -> Result<()> {
        {
            let mut slot = self.running_node.lock();
            if let Some(current) = slot.as_ref() {
                log::warn!("Node '{}' is already running, ignoring run of '{}'", current, node_id);
                return Err(CanvasFlowError::Busy);
            }
            *slot = Some(node_id.to_string());
        }
        let _guard = NodeSlotGuard(&self.running_node);

        let Some(hook) = &self.hooks.node_run else {
            log::warn!("No node run handler installed, ignoring run of '{}'", node_id);
            return Ok(());
        };
        hook.run_node(node_id).await.map_err(|e| {
            log::error!("Node '{}' run failed: {}", node_id, e);
            e
        })
    }

    /// Dispatch a group toolbar action; returns whether it took effect
    pub async fn group_action(&self, action: GroupAction) -> Result<bool> {
        match action {
            GroupAction::Create => Ok(self.edit(|ed| ed.create_group()).is_some()),
            GroupAction::Delete(id) => Ok(self.edit(|ed| ed.delete_group(&id))),
            GroupAction::Update(update) | GroupAction::Move(update) => {
                Ok(self.edit(|ed| ed.update_group(&update)))
            }
            GroupAction::Ungroup(id) => Ok(self.edit(|ed| ed.ungroup(&id)).is_some()),
            GroupAction::Run(id) => self.run_group(&id).await.map(|_| true),
            GroupAction::Save(id) => Ok(self.save_group(&id)),
        }
    }

    /// Report a group as a standalone flow (members, internal edges, the group itself)
    pub fn save_group(&self, group_id: &str) -> bool {
        let flow = self.flow.read();
        let Some(group) = flow.find_group(group_id) else {
            log::warn!("Cannot save unknown group '{}'", group_id);
            return false;
        };
        let sub_flow = flow
            .sub_flow_for_group(group_id, true)
            .unwrap_or_else(|| CanvasFlowValue {
                nodes: Vec::new(),
                edges: Vec::new(),
                groups: vec![group.clone()],
                meta: flow.meta.clone(),
            });
        drop(flow);

        self.emit(CanvasEvent::GroupSaved {
            group_id: group_id.to_string(),
            flow: sub_flow,
        });
        true
    }

    fn begin_run(&self) -> Result<RunGuard<'_>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::warn!("A run is already in flight");
            return Err(CanvasFlowError::Busy);
        }
        Ok(RunGuard(&self.running))
    }

    fn report_status(&self, node_id: &str, status: NodeExecutionStatus) {
        log::debug!("Node '{}' status: {}", node_id, status);
        self.media
            .set_field(node_id, "_executionStatus", json!(status.as_str()));
        self.emit(CanvasEvent::NodeStatusChanged {
            node_id: node_id.to_string(),
            status,
        });
    }

    fn emit(&self, event: CanvasEvent) {
        dispatch(self.sink.as_ref(), event);
    }

    // -------------------------------------------------------------------------
    // Media
    // -------------------------------------------------------------------------

    pub fn media(&self) -> &MediaStore {
        &self.media
    }

    /// Subscribe a widget to one node's media record
    pub fn subscribe_media(
        &self,
        node_id: &str,
        f: impl Fn(&MediaRecord) + Send + Sync + 'static,
    ) -> MediaHandler {
        self.media.emitter().subscribe_fn(node_id, f)
    }

    pub fn unsubscribe_media(&self, node_id: &str, handler: &MediaHandler) -> bool {
        self.media.emitter().unsubscribe(node_id, handler)
    }

    /// Set `src` on an image, video, audio or upload node
    pub fn set_node_image(&self, node_id: &str, src: impl Into<Value>) -> bool {
        self.set_typed(node_id, MediaSlot::Image, src.into(), "set_node_image")
    }

    pub fn set_node_video(&self, node_id: &str, src: impl Into<Value>) -> bool {
        self.set_typed(node_id, MediaSlot::Video, src.into(), "set_node_video")
    }

    pub fn set_node_audio(&self, node_id: &str, src: impl Into<Value>) -> bool {
        self.set_typed(node_id, MediaSlot::Audio, src.into(), "set_node_audio")
    }

    pub fn set_node_text(&self, node_id: &str, text: impl Into<Value>) -> bool {
        self.set_typed(node_id, MediaSlot::Text, text.into(), "set_node_text")
    }

    /// Set `outputData` on any existing node
    pub fn set_node_output(&self, node_id: &str, output: Value) -> bool {
        self.set_typed(node_id, MediaSlot::Output, output, "set_node_output")
    }

    fn set_typed(&self, node_id: &str, slot: MediaSlot, value: Value, caller: &str) -> bool {
        let node_type = match self.flow.read().find_node(node_id) {
            Some(node) => node.node_type.clone(),
            None => {
                log::warn!("[{}] node '{}' does not exist", caller, node_id);
                return false;
            }
        };
        if !slot.accepts(&node_type) {
            log::error!(
                "[{}] node '{}' has type '{}', which does not accept this content",
                caller,
                node_id,
                node_type
            );
            return false;
        }
        self.media.set_field(node_id, slot.field(), value)
    }

    pub fn set_node_content(&self, node_id: &str, content: &NodeData) -> bool {
        self.media.update(node_id, content)
    }

    /// Drop `src`, `text` and `outputData`
    pub fn clear_node_content(&self, node_id: &str) -> bool {
        self.media.remove_fields(node_id, &["src", "text", "outputData"])
    }

    pub fn set_node_loading(&self, node_id: &str) -> bool {
        self.media.set_field(node_id, "_loading", Value::Bool(true))
    }

    pub fn clear_node_loading(&self, node_id: &str) -> bool {
        self.media.remove_fields(node_id, &["_loading"])
    }

    pub fn set_node_error(&self, node_id: &str, message: impl Into<String>) -> bool {
        self.media
            .set_field(node_id, "_error", Value::String(message.into()))
    }

    pub fn clear_node_error(&self, node_id: &str) -> bool {
        self.media.remove_fields(node_id, &["_error"])
    }

    pub fn update_node_media(&self, node_id: &str, patch: &NodeData) -> bool {
        self.media.update(node_id, patch)
    }

    pub fn batch_update_node_media(&self, entries: &[(NodeId, NodeData)]) -> usize {
        self.media.batch_update(entries)
    }

    pub fn get_node_media(&self, node_id: &str) -> MediaRecord {
        self.media.get(node_id)
    }

    /// Show an execution state on a node
    pub fn update_node_status(&self, node_id: &str, status: NodeExecutionStatus) -> bool {
        self.media
            .set_field(node_id, "_executionStatus", json!(status.as_str()))
    }
}

fn make_editor(
    config: &Arc<CanvasConfig>,
    options: &SessionOptions,
    outbox: &Arc<VecEventSink>,
) -> CanvasEditor {
    let sink: Arc<dyn EventSink> = outbox.clone();
    let mut editor = CanvasEditor::with_sink(Arc::clone(config), sink).with_options(options.editor);
    editor.set_read_only(options.read_only);
    editor
}

/// Sub-flow run for a group: members (including legacy-tagged ones) and
/// the edges internal to them
fn group_run_flow(flow: &CanvasFlowValue, group_id: &str) -> Option<CanvasFlowValue> {
    let nodes: Vec<FlowNode> = flow
        .nodes
        .iter()
        .filter(|n| {
            n.group_id.as_deref() == Some(group_id)
                || n.data.get(keys::LEGACY_GROUP_TAG).and_then(Value::as_str) == Some(group_id)
        })
        .cloned()
        .collect();
    if nodes.is_empty() {
        return None;
    }

    let ids: std::collections::HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    let edges = flow
        .edges
        .iter()
        .filter(|e| ids.contains(e.source.as_str()) && ids.contains(e.target.as_str()))
        .cloned()
        .collect();

    Some(CanvasFlowValue {
        nodes,
        edges,
        groups: Vec::new(),
        meta: flow.meta.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FlowBuilder;
    use crate::config::default_canvas_config;
    use crate::events::CallbackEventSink;
    use crate::runner::{CallbackNodeExecutor, NodeRunResult, SyncCallbackNodeExecutor};
    use crate::types::Position;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn session() -> (CanvasSession, Arc<VecEventSink>) {
        let _ = env_logger::builder().is_test(true).try_init();
        let sink = Arc::new(VecEventSink::new());
        let session = CanvasSession::new(default_canvas_config()).with_sink(sink.clone());
        (session, sink)
    }

    fn media_flow() -> CanvasFlowValue {
        FlowBuilder::new()
            .add_node("t", "text", (0.0, 0.0))
            .add_node("i", "image", (300.0, 0.0))
            .add_node("v", "video", (600.0, 0.0))
            .add_edge("t", "i")
            .add_edge("i", "v")
            .build()
    }

    fn patch(value: Value) -> NodeData {
        match value {
            Value::Object(map) => map,
            _ => NodeData::new(),
        }
    }

    fn echo_plus_one() -> ExecutionConfig {
        ExecutionConfig::default().with_node_executor(Arc::new(SyncCallbackNodeExecutor::new(
            |ctx| {
                let output = match ctx.incoming.first() {
                    Some(v) => json!(v.as_i64().unwrap_or(0) + 1),
                    None => json!(1),
                };
                Ok(NodeRunResult::new(output))
            },
        )))
    }

    #[test]
    fn test_init_and_flow_access() {
        let (session, _) = session();
        assert_eq!(session.init(None, Some("canvas-1".into())), "canvas-1");
        assert_eq!(session.id(), "canvas-1");

        let generated = session.init(Some(media_flow()), None);
        assert!(!generated.is_empty());
        assert_ne!(generated, "canvas-1");
        assert_eq!(session.get_flow(), media_flow());
        assert_eq!(session.get_node("i").unwrap().node_type, "image");
        assert!(session.get_node("zzz").is_none());
    }

    #[test]
    fn test_connection_through_session() {
        let (session, _) = session();
        session.set_flow(
            FlowBuilder::new()
                .add_node("A", "text", (0.0, 0.0))
                .add_node("B", "image", (300.0, 0.0))
                .build(),
        );
        use crate::validation::Connection;
        assert!(session.edit(|ed| ed.connect(Connection::new("A", "B"))).is_some());
        assert!(session.edit(|ed| ed.connect(Connection::new("B", "A"))).is_none());

        let flow = session.get_flow();
        assert_eq!(flow.edges.len(), 1);
        assert_eq!(flow.edges[0].id, "e-A-B");
    }

    #[test]
    fn test_host_callbacks_reenter_session() {
        type Slot = Arc<Mutex<Option<std::sync::Weak<CanvasSession>>>>;
        let slot: Slot = Arc::default();
        let flows: Arc<Mutex<Vec<(usize, usize)>>> = Arc::default();
        let inspected: Arc<Mutex<Vec<Option<NodeId>>>> = Arc::default();

        let sink = {
            let slot = Arc::clone(&slot);
            let flows = Arc::clone(&flows);
            let inspected = Arc::clone(&inspected);
            CallbackEventSink::new(move |event| {
                let Some(session) = slot.lock().as_ref().and_then(std::sync::Weak::upgrade) else {
                    return;
                };
                match event {
                    CanvasEvent::FlowChanged { flow } => {
                        flows.lock().push((flow.edges.len(), session.get_flow().edges.len()));
                    }
                    CanvasEvent::SelectionChanged { .. } => {
                        inspected.lock().push(session.inspecting_node_id());
                        session.fit_view();
                    }
                    _ => {}
                }
            })
        };

        let session = Arc::new(CanvasSession::new(default_canvas_config()).with_sink(Arc::new(sink)));
        *slot.lock() = Some(Arc::downgrade(&session));
        session.set_flow(
            FlowBuilder::new()
                .add_node("A", "text", (0.0, 0.0))
                .add_node("B", "image", (300.0, 0.0))
                .build(),
        );

        use crate::validation::Connection;
        assert!(session.edit(|ed| ed.connect(Connection::new("A", "B"))).is_some());
        assert_eq!(*flows.lock(), vec![(1, 1)]);

        session.edit(|ed| ed.select(&["B"]));
        assert_eq!(*inspected.lock(), vec![Some("B".to_string())]);
    }

    #[test]
    fn test_uploading_flag_is_refused() {
        let (session, _) = session();
        session.set_flow(media_flow());

        assert!(!session.update_node_media("i", &patch(json!({"_uploading": true}))));
        assert!(!session.get_node_media("i").contains_key("_uploading"));
        assert!(!session.set_node_content("i", &patch(json!({"_uploading": true}))));
        assert!(session.get_node_media("i").is_empty());
    }

    #[test]
    fn test_typed_setters_check_node_type() {
        let (session, _) = session();
        session.set_flow(media_flow());

        assert!(!session.set_node_video("t", "clip.mp4"));
        assert!(session.get_node_media("t").is_empty());
        assert!(session.set_node_text("t", "hello"));
        assert!(session.set_node_image("v", "poster.png"));
        assert!(session.set_node_video("v", "clip.mp4"));
        assert!(!session.set_node_audio("v", "a.mp3"));
        assert!(!session.set_node_output("missing", json!(1)));
        assert!(session.set_node_output("i", json!({"url": "x"})));

        assert_eq!(session.get_node_media("t")["text"], "hello");
        assert_eq!(session.get_node_media("v")["src"], "clip.mp4");
        assert_eq!(session.get_node_media("i")["outputData"]["url"], "x");
    }

    #[test]
    fn test_loading_error_and_clear() {
        let (session, _) = session();
        session.set_flow(media_flow());
        let seen = Arc::new(AtomicUsize::new(0));
        let handler = {
            let seen = Arc::clone(&seen);
            session.subscribe_media("i", move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
        };

        session.set_node_image("i", "a.png");
        session.set_node_loading("i");
        session.set_node_error("i", "quota exceeded");
        let record = session.get_node_media("i");
        assert_eq!(record["_loading"], true);
        assert_eq!(record["_error"], "quota exceeded");

        session.clear_node_loading("i");
        session.clear_node_error("i");
        session.clear_node_content("i");
        assert!(session.get_node_media("i").is_empty());
        assert_eq!(seen.load(Ordering::SeqCst), 6);

        assert!(session.unsubscribe_media("i", &handler));
        session.update_node_status("i", NodeExecutionStatus::Running);
        assert_eq!(seen.load(Ordering::SeqCst), 6);
        assert_eq!(session.get_node_media("i")["_executionStatus"], "running");
    }

    #[test]
    fn test_upstream_nodes_use_definition_labels_and_media() {
        let (session, _) = session();
        session.set_flow(
            FlowBuilder::new()
                .add_node("c", "custom", (0.0, 0.0))
                .add_node("t", "text", (0.0, 200.0))
                .add_node("v", "video", (300.0, 0.0))
                .add_edge("c", "v")
                .add_edge("t", "v")
                .build(),
        );
        session.set_node_text("t", "prompt");

        let upstream = session.get_upstream_nodes("v");
        assert_eq!(upstream.len(), 2);
        assert_eq!(upstream[0].label, "custom");
        assert_eq!(upstream[1].label, "Text");
        assert_eq!(upstream[1].data["text"], "prompt");
        assert_eq!(upstream[1].position, Position::new(0.0, 200.0));
    }

    #[tokio::test]
    async fn test_run_flow_reports_statuses() {
        let (session, sink) = session();
        let session = session.with_execution(echo_plus_one());
        session.set_flow(
            FlowBuilder::new()
                .add_node("A", "text", (0.0, 0.0))
                .add_node("B", "text", (300.0, 0.0))
                .add_node("C", "text", (600.0, 0.0))
                .add_edge("A", "B")
                .add_edge("B", "C")
                .build(),
        );

        let outcome = session.run_flow().await.unwrap();
        let results = outcome.results().unwrap();
        assert_eq!(results["A"].output, json!(1));
        assert_eq!(results["B"].output, json!(2));
        assert_eq!(results["C"].output, json!(3));

        let statuses: Vec<(String, NodeExecutionStatus)> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                CanvasEvent::NodeStatusChanged { node_id, status } => Some((node_id, status)),
                _ => None,
            })
            .collect();
        use NodeExecutionStatus::{Running, Success};
        assert_eq!(
            statuses,
            vec![
                ("A".to_string(), Running),
                ("A".to_string(), Success),
                ("B".to_string(), Running),
                ("B".to_string(), Success),
                ("C".to_string(), Running),
                ("C".to_string(), Success),
            ]
        );
        assert_eq!(sink.count("flowRunRequested"), 1);
        assert_eq!(session.get_node_media("C")["_executionStatus"], "success");
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_reentrant_run_is_refused() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let executor = {
            let gate = Arc::clone(&gate);
            CallbackNodeExecutor::new(move |_ctx| {
                let gate = Arc::clone(&gate);
                async move {
                    gate.notified().await;
                    Ok(NodeRunResult::new(json!(null)))
                }
            })
        };
        let (session, _) = session();
        let session = session
            .with_execution(ExecutionConfig::default().with_node_executor(Arc::new(executor)));
        session.set_flow(FlowBuilder::new().add_node("A", "text", (0.0, 0.0)).build());

        let (first, second) = tokio::join!(session.run_flow(), async {
            let second = session.run_flow().await;
            gate.notify_one();
            second
        });
        assert!(first.is_ok());
        assert!(matches!(second, Err(CanvasFlowError::Busy)));
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_failed_node_marks_error() {
        let (session, _) = session();
        let session = session.with_execution(ExecutionConfig::default().with_node_executor(
            Arc::new(SyncCallbackNodeExecutor::new(|_| Err(CanvasFlowError::failed("model offline")))),
        ));
        session.set_flow(media_flow());

        assert!(session.run_flow().await.is_err());
        assert_eq!(session.get_node_media("t")["_executionStatus"], "error");
        assert!(!session.get_node_media("i").contains_key("_executionStatus"));
    }

    #[tokio::test]
    async fn test_run_group_variants() {
        struct Recorder(Mutex<Vec<String>>);

        #[async_trait]
        impl GroupRunHandler for Recorder {
            async fn run_group(&self, group_id: &str) -> Result<()> {
                self.0.lock().push(group_id.to_string());
                Ok(())
            }
        }

        let flow = FlowBuilder::new()
            .add_group("g", (0.0, 0.0), (800.0, 300.0))
            .add_node("A", "text", (10.0, 10.0))
            .in_group("g")
            .add_node("B", "text", (300.0, 10.0))
            .with_data(json!({"_groupId": "g"}))
            .add_node("C", "text", (900.0, 10.0))
            .add_edge("A", "B")
            .add_edge("B", "C")
            .build();

        let (session, _) = session();
        let session = session.with_execution(echo_plus_one());
        session.set_flow(flow.clone());
        let outcome = session.run_group("g").await.unwrap().unwrap();
        let results = outcome.results().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results["B"].output, json!(2));
        assert!(session.run_group("empty").await.unwrap().is_none());

        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let (hooked, _) = self::session();
        let hooked = hooked.with_hooks(SessionHooks::default().with_group_run(recorder.clone()));
        hooked.set_flow(flow);
        assert!(hooked.run_group("g").await.unwrap().is_none());
        assert_eq!(*recorder.0.lock(), vec!["g".to_string()]);
    }

    #[tokio::test]
    async fn test_run_node_uses_hook_and_slot() {
        struct Slow(tokio::sync::Notify);

        #[async_trait]
        impl NodeRunHandler for Slow {
            async fn run_node(&self, _node_id: &str) -> Result<()> {
                self.0.notified().await;
                Ok(())
            }
        }

        let (plain, _) = session();
        assert!(plain.run_node("x").await.is_ok());

        let slow = Arc::new(Slow(tokio::sync::Notify::new()));
        let (session, _) = session();
        let session = session.with_hooks(SessionHooks::default().with_node_run(slow.clone()));

        let (first, second) = tokio::join!(session.run_node("a"), async {
            assert_eq!(session.running_node_id().as_deref(), Some("a"));
            assert!(session.is_running());
            let second = session.run_node("b").await;
            slow.0.notify_one();
            second
        });
        assert!(first.is_ok());
        assert!(matches!(second, Err(CanvasFlowError::Busy)));
        assert!(session.running_node_id().is_none());
    }

    #[tokio::test]
    async fn test_group_actions() {
        let (session, sink) = session();
        session.set_flow(
            FlowBuilder::new()
                .add_node("a", "text", (0.0, 0.0))
                .with_size(100.0, 50.0)
                .add_node("b", "text", (200.0, 0.0))
                .with_size(100.0, 50.0)
                .add_edge_with_handles("a", "out", "b", "in")
                .named("doc")
                .build(),
        );

        session.edit(|ed| ed.select(&["a", "b"]));
        assert!(session.group_action(GroupAction::Create).await.unwrap());
        let group_id = session.get_flow().groups[0].id.clone();

        assert!(session
            .group_action(GroupAction::Save(group_id.clone()))
            .await
            .unwrap());
        let saved = sink.events().into_iter().find_map(|e| match e {
            CanvasEvent::GroupSaved { flow, .. } => Some(flow),
            _ => None,
        });
        let saved = saved.unwrap();
        assert_eq!(saved.groups.len(), 1);
        assert_eq!(saved.nodes.len(), 2);
        assert_eq!(saved.edges.len(), 1);
        assert_eq!(saved.meta.unwrap().name.as_deref(), Some("doc"));

        let moved = GroupUpdate {
            id: group_id.clone(),
            position: Some(Position::new(10.0, 10.0)),
            ..Default::default()
        };
        assert!(session.group_action(GroupAction::Move(moved)).await.unwrap());
        assert_eq!(session.get_flow().groups[0].position, Position::new(10.0, 10.0));

        assert!(session
            .group_action(GroupAction::Ungroup(group_id.clone()))
            .await
            .unwrap());
        assert!(session.get_flow().groups.is_empty());
        assert!(!session.group_action(GroupAction::Delete(group_id)).await.unwrap());
        assert!(!session.save_group("nope"));
    }

    #[test]
    fn test_delete_group_through_session() {
        let (session, sink) = session();
        session.set_flow(
            FlowBuilder::new()
                .add_group("g", (0.0, 0.0), (600.0, 300.0))
                .add_node("a", "text", (20.0, 20.0))
                .in_group("g")
                .add_node("b", "image", (300.0, 20.0))
                .in_group("g")
                .add_edge("a", "b")
                .build(),
        );

        assert!(session.edit(|ed| ed.delete_group("g")));
        assert_eq!(sink.count("groupDeleted"), 1);
        assert_eq!(sink.count("nodeDeleted"), 0);
        let flow = session.get_flow();
        assert!(flow.groups.is_empty());
        assert!(flow.nodes.is_empty());
        assert!(flow.edges.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_data_changes_are_debounced() {
        let (session, sink) = session();
        session.set_flow(
            FlowBuilder::new()
                .add_node("t", "text", (0.0, 0.0))
                .with_data(json!({"text": "", "prompt": "keep"}))
                .build(),
        );

        for text in ["h", "he", "hey"] {
            session.update_node_data("t", &patch(json!({ "text": text })));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        // Local state is immediate
        assert_eq!(session.get_node("t").unwrap().data["text"], "hey");
        assert_eq!(sink.count("nodeDataChanged"), 0);

        tokio::time::sleep(Duration::from_millis(500)).await;
        let changes: Vec<NodeData> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                CanvasEvent::NodeDataChanged { data, .. } => Some(data),
                _ => None,
            })
            .collect();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0]["text"], "hey");
        assert_eq!(changes[0]["prompt"], "keep");
    }

    #[test]
    fn test_read_only_session() {
        let (session, _) = session();
        let session = session.with_options(SessionOptions {
            read_only: true,
            ..Default::default()
        });
        session.set_flow(media_flow());
        assert!(session.is_read_only());
        assert!(session.update_node_data("t", &patch(json!({"text": "x"}))).is_none());
        assert!(!session.edit(|ed| ed.delete_node("t")));
        assert_eq!(session.get_flow(), media_flow());
    }

    #[test]
    fn test_render_inspector() {
        struct Panel;

        impl InspectorRenderer for Panel {
            fn render(&self, node_id: &str, node: &FlowNode) -> Value {
                json!({"title": node_id, "type": node.node_type})
            }
        }

        let (session, _) = session();
        let session = session.with_hooks(SessionHooks::default().with_inspector(Arc::new(Panel)));
        session.set_flow(media_flow());
        assert!(session.render_inspector().is_none());

        session.edit(|ed| ed.select(&["i"]));
        assert_eq!(session.inspecting_node_id().as_deref(), Some("i"));
        let panel = session.render_inspector().unwrap();
        assert_eq!(panel["type"], "image");

        session.edit(|ed| ed.select(&["i", "v"]));
        assert!(session.render_inspector().is_none());
    }
}
