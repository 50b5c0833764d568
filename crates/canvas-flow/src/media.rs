//! Live per-node media channel
//!
//! Generation output, loading flags and errors change far more often than
//! the structure document. They live here instead, keyed by node id, and
//! reach node widgets through a synchronous per-node publish/subscribe
//! emitter. Nothing in this module is ever persisted.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::types::{NodeData, NodeId, StandardNodeType};

/// Live data for one node, restricted to [`MEDIA_FIELDS`]
pub type MediaRecord = NodeData;

/// Handler invoked with the full record on every write
pub type MediaHandler = Arc<dyn Fn(&MediaRecord) + Send + Sync>;

/// Content fields a media record may carry
pub const CONTENT_FIELDS: [&str; 8] = [
    "src",
    "text",
    "output",
    "outputData",
    "fileName",
    "fileType",
    "fileSize",
    "resourceType",
];

/// UI-state fields a media record may carry
pub const UI_STATE_FIELDS: [&str; 4] = ["_loading", "_error", "_executionStatus", "_contentSize"];

/// Every field accepted by the media store
pub const MEDIA_FIELDS: [&str; 12] = [
    "src",
    "text",
    "output",
    "outputData",
    "fileName",
    "fileType",
    "fileSize",
    "resourceType",
    "_loading",
    "_error",
    "_executionStatus",
    "_contentSize",
];

pub fn is_media_field(key: &str) -> bool {
    MEDIA_FIELDS.contains(&key)
}

/// Per-node observer registry
#[derive(Default)]
pub struct MediaEmitter {
    listeners: Mutex<HashMap<NodeId, Vec<MediaHandler>>>,
}

impl MediaEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a node
    ///
    /// Registering the same handler twice is a no-op.
    pub fn subscribe(&self, node_id: &str, handler: MediaHandler) {
        let mut listeners = self.listeners.lock();
        let bucket = listeners.entry(node_id.to_string()).or_default();
        if !bucket.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            bucket.push(handler);
        }
    }

    /// Wrap a closure and register it, returning the handle for unsubscribing
    pub fn subscribe_fn(
        &self,
        node_id: &str,
        f: impl Fn(&MediaRecord) + Send + Sync + 'static,
    ) -> MediaHandler {
        let handler: MediaHandler = Arc::new(f);
        self.subscribe(node_id, Arc::clone(&handler));
        handler
    }

    /// Remove a handler; the node's bucket is freed with its last handler
    ///
    /// Returns whether the handler was registered.
    pub fn unsubscribe(&self, node_id: &str, handler: &MediaHandler) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(bucket) = listeners.get_mut(node_id) else {
            return false;
        };
        let before = bucket.len();
        bucket.retain(|h| !Arc::ptr_eq(h, handler));
        let removed = bucket.len() != before;
        if bucket.is_empty() {
            listeners.remove(node_id);
        }
        removed
    }

    /// Invoke every handler of `node_id` with the full record
    pub fn emit(&self, node_id: &str, record: &MediaRecord) {
        // Handlers run outside the lock so they may (un)subscribe
        let handlers: Vec<MediaHandler> = match self.listeners.lock().get(node_id) {
            Some(bucket) => bucket.clone(),
            None => return,
        };
        for handler in handlers {
            handler(record);
        }
    }

    /// Emit each entry in turn, with no atomicity across the batch
    pub fn batch_emit(&self, entries: &[(NodeId, MediaRecord)]) {
        for (node_id, record) in entries {
            self.emit(node_id, record);
        }
    }

    /// Total number of registered handlers across all nodes
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().values().map(Vec::len).sum()
    }

    /// Number of handlers registered for one node
    pub fn listener_count_for(&self, node_id: &str) -> usize {
        self.listeners.lock().get(node_id).map_or(0, Vec::len)
    }

    /// Whether a bucket exists for this node
    pub fn has_bucket(&self, node_id: &str) -> bool {
        self.listeners.lock().contains_key(node_id)
    }

    /// Drop every handler
    pub fn clear(&self) {
        self.listeners.lock().clear();
    }
}

/// Typed content slots written by the per-type setters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSlot {
    Image,
    Video,
    Audio,
    Text,
    Output,
}

impl MediaSlot {
    /// The record field the slot writes
    pub fn field(&self) -> &'static str {
        match self {
            Self::Image | Self::Video | Self::Audio => "src",
            Self::Text => "text",
            Self::Output => "outputData",
        }
    }

    /// Whether a node of this type may receive the slot
    pub fn accepts(&self, node_type: &str) -> bool {
        use StandardNodeType as T;
        let parsed = StandardNodeType::parse(node_type);
        match self {
            // Any media-bearing node can show an image preview
            Self::Image => matches!(
                parsed,
                Some(T::Image | T::Video | T::Audio | T::Upload)
            ),
            Self::Video => parsed == Some(T::Video),
            Self::Audio => parsed == Some(T::Audio),
            Self::Text => parsed == Some(T::Text),
            Self::Output => true,
        }
    }
}

/// Whitelisted per-node record store feeding a [`MediaEmitter`]
#[derive(Default)]
pub struct MediaStore {
    records: Mutex<HashMap<NodeId, MediaRecord>>,
    emitter: MediaEmitter,
}

impl MediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emitter(&self) -> &MediaEmitter {
        &self.emitter
    }

    /// Current record of a node (empty if never written)
    pub fn get(&self, node_id: &str) -> MediaRecord {
        self.records.lock().get(node_id).cloned().unwrap_or_default()
    }

    /// Whether a record was ever written for this node
    pub fn contains(&self, node_id: &str) -> bool {
        self.records.lock().contains_key(node_id)
    }

    /// Merge a patch into a node's record and notify its handlers
    ///
    /// Fields outside the whitelist are logged and dropped; `null` removes
    /// a field. Returns `false` when nothing was written.
    pub fn update(&self, node_id: &str, patch: &NodeData) -> bool {
        let Some(record) = self.merge(node_id, patch) else {
            return false;
        };
        self.emitter.emit(node_id, &record);
        true
    }

    /// Write a single field
    pub fn set_field(&self, node_id: &str, key: &str, value: Value) -> bool {
        let mut patch = NodeData::new();
        patch.insert(key.to_string(), value);
        self.update(node_id, &patch)
    }

    /// Remove fields from a record
    pub fn remove_fields(&self, node_id: &str, keys: &[&str]) -> bool {
        let patch: NodeData = keys
            .iter()
            .map(|k| (k.to_string(), Value::Null))
            .collect();
        self.update(node_id, &patch)
    }

    /// Merge every entry first, then notify in one pass
    pub fn batch_update(&self, entries: &[(NodeId, NodeData)]) -> usize {
        let merged: Vec<(NodeId, MediaRecord)> = entries
            .iter()
            .filter_map(|(id, patch)| self.merge(id, patch).map(|r| (id.clone(), r)))
            .collect();
        self.emitter.batch_emit(&merged);
        merged.len()
    }

    /// Forget one node's record
    pub fn remove(&self, node_id: &str) {
        self.records.lock().remove(node_id);
    }

    /// Forget all records and handlers
    pub fn clear(&self) {
        self.records.lock().clear();
        self.emitter.clear();
    }

    fn merge(&self, node_id: &str, patch: &NodeData) -> Option<MediaRecord> {
        let mut accepted = Vec::with_capacity(patch.len());
        for (key, value) in patch {
            if is_media_field(key) {
                accepted.push((key, value));
            } else {
                log::warn!(
                    "Rejected media field '{}' for node '{}': not a media field",
                    key,
                    node_id
                );
            }
        }
        if accepted.is_empty() {
            return None;
        }

        let mut records = self.records.lock();
        let record = records.entry(node_id.to_string()).or_default();
        for (key, value) in accepted {
            if value.is_null() {
                record.remove(key);
            } else {
                record.insert(key.clone(), value.clone());
            }
        }
        Some(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn data(value: Value) -> NodeData {
        match value {
            Value::Object(map) => map,
            _ => NodeData::new(),
        }
    }

    #[test]
    fn test_emit_reaches_every_handler() {
        let emitter = MediaEmitter::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h1 = {
            let hits = Arc::clone(&hits);
            emitter.subscribe_fn("a", move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        let h2 = {
            let hits = Arc::clone(&hits);
            emitter.subscribe_fn("a", move |_| {
                hits.fetch_add(10, Ordering::SeqCst);
            })
        };

        emitter.emit("a", &NodeData::new());
        emitter.emit("other", &NodeData::new());
        assert_eq!(hits.load(Ordering::SeqCst), 11);
        assert_eq!(emitter.listener_count(), 2);

        assert!(emitter.unsubscribe("a", &h1));
        assert!(emitter.has_bucket("a"));
        assert!(emitter.unsubscribe("a", &h2));
        assert!(!emitter.has_bucket("a"));
        assert!(!emitter.unsubscribe("a", &h2));
    }

    #[test]
    fn test_duplicate_subscribe_is_a_set() {
        let emitter = MediaEmitter::new();
        let handler: MediaHandler = Arc::new(|_| {});
        emitter.subscribe("a", Arc::clone(&handler));
        emitter.subscribe("a", Arc::clone(&handler));
        assert_eq!(emitter.listener_count_for("a"), 1);
        emitter.clear();
        assert_eq!(emitter.listener_count(), 0);
    }

    #[test]
    fn test_store_emits_full_record_in_order() {
        let store = MediaStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            store.emitter().subscribe_fn("a", move |record| {
                seen.lock().push(record.clone());
            });
        }

        store.set_field("a", "src", json!("one.png"));
        store.set_field("a", "_loading", json!(true));

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        // Full record, not a diff
        assert_eq!(seen[1]["src"], "one.png");
        assert_eq!(seen[1]["_loading"], true);
    }

    #[test]
    fn test_whitelist_rejects_unknown_fields() {
        let store = MediaStore::new();
        assert!(!store.set_field("a", "_uploading", json!(true)));
        assert!(!store.get("a").contains_key("_uploading"));
        assert!(!store.contains("a"));

        // Mixed patch keeps only whitelisted keys
        assert!(store.update("a", &data(json!({"text": "hi", "label": "x"}))));
        let record = store.get("a");
        assert_eq!(record["text"], "hi");
        assert!(!record.contains_key("label"));
    }

    #[test]
    fn test_null_removes_field() {
        let store = MediaStore::new();
        store.update("a", &data(json!({"src": "x", "text": "y", "_error": "boom"})));
        store.remove_fields("a", &["src", "text", "outputData"]);
        store.set_field("a", "_error", Value::Null);
        assert!(store.get("a").is_empty());
    }

    #[test]
    fn test_batch_update() {
        let store = MediaStore::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for id in ["a", "b"] {
            let hits = Arc::clone(&hits);
            store.emitter().subscribe_fn(id, move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        let written = store.batch_update(&[
            ("a".into(), data(json!({"output": 1}))),
            ("b".into(), data(json!({"nope": 1}))),
            ("b".into(), data(json!({"output": 2}))),
        ]);
        assert_eq!(written, 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(store.get("b")["output"], 2);
    }

    #[test]
    fn test_media_slot_type_checks() {
        assert!(MediaSlot::Image.accepts("user-upload"));
        assert!(MediaSlot::Image.accepts("video"));
        assert!(!MediaSlot::Image.accepts("text"));
        assert!(MediaSlot::Text.accepts("text"));
        assert!(!MediaSlot::Video.accepts("image"));
        assert!(MediaSlot::Output.accepts("anything"));
        assert_eq!(MediaSlot::Output.field(), "outputData");
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let emitter = Arc::new(MediaEmitter::new());
        let slot: Arc<Mutex<Option<MediaHandler>>> = Arc::new(Mutex::new(None));
        let handler: MediaHandler = {
            let emitter = Arc::clone(&emitter);
            let slot = Arc::clone(&slot);
            Arc::new(move |_| {
                if let Some(me) = slot.lock().as_ref() {
                    emitter.unsubscribe("a", me);
                }
            })
        };
        *slot.lock() = Some(Arc::clone(&handler));
        emitter.subscribe("a", handler);
        emitter.emit("a", &NodeData::new());
        assert_eq!(emitter.listener_count(), 0);
    }
}
