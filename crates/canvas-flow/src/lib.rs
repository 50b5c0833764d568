//! Canvas Flow - Node-graph canvas editing engine
//!
//! This crate holds the editing logic behind a visual workflow canvas:
//!
//! - Conversion between the persisted structure document and view state
//! - Group containers with relative child positioning
//! - Connection rules and DAG enforcement
//! - A per-node media store with whitelisted fields and subscriptions
//! - Sequential flow execution behind a pluggable executor
//!
//! Rendering is left to the host. The host feeds gestures into a
//! [`CanvasSession`] and receives [`CanvasEvent`]s through an
//! [`EventSink`].
//!
//! # Example
//!
//! ```ignore
//! use canvas_flow::{default_canvas_config, CanvasSession, FlowBuilder};
//!
//! let session = CanvasSession::new(default_canvas_config());
//! session.init(
//!     Some(
//!         FlowBuilder::new()
//!             .add_node("prompt", "text", (0.0, 0.0))
//!             .add_node("render", "image", (320.0, 0.0))
//!             .add_edge("prompt", "render")
//!             .build(),
//!     ),
//!     None,
//! );
//! session.set_node_image("render", "https://example.com/out.png");
//! ```

pub mod builder;
pub mod config;
pub mod constants;
pub mod convert;
pub mod debounce;
pub mod editor;
pub mod error;
pub mod events;
pub mod media;
pub mod runner;
pub mod session;
pub mod types;
pub mod validation;
pub mod viewport;

// Re-export key types
pub use builder::FlowBuilder;
pub use config::{default_canvas_config, CanvasConfig, EditorOptions, NodeDefinition, SessionOptions};
pub use convert::{from_view_edges, from_view_nodes, to_view_edges, to_view_nodes, ViewEdge, ViewNode};
pub use editor::CanvasEditor;
pub use error::{CanvasFlowError, Result};
pub use events::{CanvasEvent, EventSink, NullEventSink, VecEventSink};
pub use media::{MediaEmitter, MediaStore};
pub use runner::{
    CallbackNodeExecutor, ExecutionConfig, FlowExecutor, FlowRunner, NodeExecutor,
    SyncCallbackNodeExecutor,
};
pub use session::{CanvasSession, GroupAction, SessionHooks};
pub use types::{CanvasFlowValue, FlowEdge, FlowGroup, FlowNode, NodeExecutionStatus};
pub use validation::{is_acyclic, is_connection_allowed, validate_flow, Connection};
pub use viewport::Viewport;
