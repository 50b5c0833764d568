//! Sequential flow runner
//!
//! Nodes run strictly in the order the structure lists them, each one fed
//! the outputs of its already-finished upstream nodes. Callers that need
//! dependency order must supply an execution-ordered node list; the
//! runner does not sort.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CanvasFlowError, Result};
use crate::types::{CanvasFlowValue, FlowNode, NodeExecutionStatus, NodeId};

/// Everything a per-node executor receives
#[derive(Debug, Clone)]
pub struct NodeRunContext {
    pub node: FlowNode,
    pub flow: Arc<CanvasFlowValue>,
    /// Outputs of finished nodes feeding this one, in edge order
    pub incoming: Vec<Value>,
}

/// Result of one node's execution
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRunResult {
    pub output: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Value>,
}

impl NodeRunResult {
    pub fn new(output: Value) -> Self {
        Self {
            output,
            artifacts: Vec::new(),
        }
    }
}

/// Per-node executor injected by the host
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn run_node(&self, ctx: NodeRunContext) -> Result<NodeRunResult>;
}

/// Full-flow executor; when present the runner defers to it entirely
#[async_trait]
pub trait FlowExecutor: Send + Sync {
    async fn run_flow(&self, flow: &CanvasFlowValue) -> Result<Value>;
}

type NodeFuture = Pin<Box<dyn Future<Output = Result<NodeRunResult>> + Send>>;

/// Async callback-based NodeExecutor
pub struct CallbackNodeExecutor {
    callback: Box<dyn Fn(NodeRunContext) -> NodeFuture + Send + Sync>,
}

impl CallbackNodeExecutor {
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn(NodeRunContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<NodeRunResult>> + Send + 'static,
    {
        Self {
            callback: Box::new(move |ctx| Box::pin(callback(ctx))),
        }
    }
}

#[async_trait]
impl NodeExecutor for CallbackNodeExecutor {
    async fn run_node(&self, ctx: NodeRunContext) -> Result<NodeRunResult> {
        (self.callback)(ctx).await
    }
}

/// Synchronous callback-based NodeExecutor
pub struct SyncCallbackNodeExecutor {
    callback: Box<dyn Fn(&NodeRunContext) -> Result<NodeRunResult> + Send + Sync>,
}

impl SyncCallbackNodeExecutor {
    pub fn new(
        callback: impl Fn(&NodeRunContext) -> Result<NodeRunResult> + Send + Sync + 'static,
    ) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }
}

#[async_trait]
impl NodeExecutor for SyncCallbackNodeExecutor {
    async fn run_node(&self, ctx: NodeRunContext) -> Result<NodeRunResult> {
        (self.callback)(&ctx)
    }
}

/// Injected executors; either may be absent
#[derive(Clone, Default)]
pub struct ExecutionConfig {
    pub node_executor: Option<Arc<dyn NodeExecutor>>,
    pub flow_executor: Option<Arc<dyn FlowExecutor>>,
}

impl ExecutionConfig {
    pub fn with_node_executor(mut self, executor: Arc<dyn NodeExecutor>) -> Self {
        self.node_executor = Some(executor);
        self
    }

    pub fn with_flow_executor(mut self, executor: Arc<dyn FlowExecutor>) -> Self {
        self.flow_executor = Some(executor);
        self
    }
}

/// What a run produced
#[derive(Debug, Clone, PartialEq)]
pub enum FlowRunOutcome {
    /// The full-flow executor handled the run
    Delegated(Value),
    /// Per-node results keyed by node id
    Results(HashMap<NodeId, NodeRunResult>),
}

impl FlowRunOutcome {
    /// Per-node results, if the run went node by node
    pub fn results(&self) -> Option<&HashMap<NodeId, NodeRunResult>> {
        match self {
            Self::Results(results) => Some(results),
            Self::Delegated(_) => None,
        }
    }
}

pub struct FlowRunner {
    config: ExecutionConfig,
}

impl FlowRunner {
    pub fn new(config: ExecutionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Run a flow, reporting each node's status through `on_status`
    ///
    /// The first failing node is reported as `Error` and aborts the run.
    pub async fn run_flow<S>(&self, flow: &CanvasFlowValue, mut on_status: S) -> Result<FlowRunOutcome>
    where
        S: FnMut(&str, NodeExecutionStatus) + Send,
    {
        if let Some(flow_executor) = &self.config.flow_executor {
            log::debug!("Delegating run of {} nodes to flow executor", flow.nodes.len());
            return flow_executor.run_flow(flow).await.map(FlowRunOutcome::Delegated);
        }

        let shared = Arc::new(flow.clone());
        let mut results: HashMap<NodeId, NodeRunResult> = HashMap::new();

        for node in &flow.nodes {
            on_status(&node.id, NodeExecutionStatus::Running);

            let incoming: Vec<Value> = flow
                .incoming_edges(&node.id)
                .filter_map(|edge| results.get(&edge.source))
                .map(|r| r.output.clone())
                .collect();

            let ctx = NodeRunContext {
                node: node.clone(),
                flow: Arc::clone(&shared),
                incoming,
            };

            match self.run_node(ctx).await {
                Ok(result) => {
                    results.insert(node.id.clone(), result);
                    on_status(&node.id, NodeExecutionStatus::Success);
                }
                Err(e) => {
                    log::error!("Node '{}' failed: {}", node.id, e);
                    on_status(&node.id, NodeExecutionStatus::Error);
                    return Err(e);
                }
            }
        }

        Ok(FlowRunOutcome::Results(results))
    }

    /// Run a single node through the injected executor
    ///
    /// Without an executor the node yields a `null` output.
    pub async fn run_node(&self, ctx: NodeRunContext) -> Result<NodeRunResult> {
        match &self.config.node_executor {
            Some(executor) => executor.run_node(ctx).await,
            None => {
                log::warn!("No node executor configured, node '{}' produces no output", ctx.node.id);
                Ok(NodeRunResult::new(Value::Null))
            }
        }
    }

    /// Run only the members of a group and the edges internal to them
    pub async fn run_group<S>(
        &self,
        flow: &CanvasFlowValue,
        group_id: &str,
        on_status: S,
    ) -> Result<FlowRunOutcome>
    where
        S: FnMut(&str, NodeExecutionStatus) + Send,
    {
        let sub_flow = flow
            .sub_flow_for_group(group_id, false)
            .ok_or_else(|| CanvasFlowError::GroupNotFound(group_id.to_string()))?;
        self.run_flow(&sub_flow, on_status).await
    }
}
