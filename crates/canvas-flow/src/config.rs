//! Node-type configuration
//!
//! The configuration object is passed to each editor session at
//! construction; there is no process-wide registry. It declares the
//! node types a canvas offers, their default payloads and sizes, and the
//! connection allow-lists consulted by the rules engine.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::constants::{editor, sizes, timings};
use crate::error::{CanvasFlowError, Result};
use crate::types::{NodeData, Position, Size, StandardNodeType};

/// Per-type connection allow-lists
///
/// A missing list means no restriction from that side.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRules {
    /// Upstream types allowed to connect into this node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_sources: Option<Vec<String>>,
    /// Downstream types this node may connect to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_targets: Option<Vec<String>>,
}

/// Definition of a node type offered on the canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDefinition {
    /// Unique type identifier (e.g. "text")
    #[serde(rename = "type")]
    pub node_type: String,
    /// Human-readable label
    pub label: String,
    /// Key of the body widget in the host's component registry
    pub component: String,
    /// Payload given to freshly created nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_data: Option<NodeData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_rules: Option<ConnectionRules>,
}

impl NodeDefinition {
    /// Create a definition without defaults or rules
    pub fn new(
        node_type: impl Into<String>,
        label: impl Into<String>,
        component: impl Into<String>,
    ) -> Self {
        Self {
            node_type: node_type.into(),
            label: label.into(),
            component: component.into(),
            default_data: None,
            width: None,
            height: None,
            connection_rules: None,
        }
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_default_data(mut self, data: NodeData) -> Self {
        self.default_data = Some(data);
        self
    }

    /// Restrict which types may connect into this node
    pub fn allow_sources<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.connection_rules
            .get_or_insert_with(ConnectionRules::default)
            .allowed_sources = Some(types.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict which types this node may connect to
    pub fn allow_targets<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.connection_rules
            .get_or_insert_with(ConnectionRules::default)
            .allowed_targets = Some(types.into_iter().map(Into::into).collect());
        self
    }

    pub fn allowed_sources(&self) -> Option<&[String]> {
        self.connection_rules
            .as_ref()
            .and_then(|r| r.allowed_sources.as_deref())
    }

    pub fn allowed_targets(&self) -> Option<&[String]> {
        self.connection_rules
            .as_ref()
            .and_then(|r| r.allowed_targets.as_deref())
    }
}

/// Canvas-level presentation settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
}

/// Complete canvas configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasConfig {
    /// All node types available on this canvas
    pub node_definitions: Vec<NodeDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<CanvasStyle>,
}

impl CanvasConfig {
    /// Parse a configuration from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: CanvasConfig = serde_json::from_str(json)?;
        config.check()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await?;
        let config = Self::from_json_str(&contents)?;
        log::info!(
            "Loaded canvas configuration with {} node types from {:?}",
            config.node_definitions.len(),
            path
        );
        Ok(config)
    }

    /// Get the definition for a node type
    pub fn definition(&self, node_type: &str) -> Option<&NodeDefinition> {
        self.node_definitions.iter().find(|d| d.node_type == node_type)
    }

    /// Check if a node type is declared
    pub fn has_node_type(&self, node_type: &str) -> bool {
        self.definition(node_type).is_some()
    }

    /// Display label for a node type, falling back to the type string
    pub fn label_for<'a>(&'a self, node_type: &'a str) -> &'a str {
        self.definition(node_type)
            .map(|d| d.label.as_str())
            .unwrap_or(node_type)
    }

    /// Payload for a fresh node of this type
    ///
    /// The definition's declared defaults win over the built-in ones.
    pub fn initial_data(&self, node_type: &str) -> NodeData {
        match self.definition(node_type).and_then(|d| d.default_data.clone()) {
            Some(data) => data,
            None => default_node_data(node_type),
        }
    }

    /// Reject duplicate type declarations
    fn check(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for def in &self.node_definitions {
            if !seen.insert(def.node_type.as_str()) {
                return Err(CanvasFlowError::Config(format!(
                    "node type '{}' declared more than once",
                    def.node_type
                )));
            }
        }
        Ok(())
    }
}

/// Geometry used by editor gestures
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EditorOptions {
    /// Margin added on every side of a new group's member bounds
    pub group_padding: f64,
    /// Size given to dropped nodes whose definition declares none
    pub default_node_size: Size,
    /// Subtracted from the drop point so a dropped node centers on the pointer
    pub drop_offset: Position,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            group_padding: editor::GROUP_PADDING,
            default_node_size: Size::new(sizes::NODE_FALLBACK, sizes::NODE_FALLBACK),
            drop_offset: Position::new(editor::DROP_OFFSET_X, editor::DROP_OFFSET_Y),
        }
    }
}

/// Per-session behavior
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    /// Quiet interval before a data change reaches the host
    pub debounce: Duration,
    /// Ignore every mutating gesture
    pub read_only: bool,
    pub editor: EditorOptions,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(timings::DATA_CHANGE_DEBOUNCE_MS),
            read_only: false,
            editor: EditorOptions::default(),
        }
    }
}

/// Built-in payload for a fresh node (media fields only)
pub fn default_node_data(node_type: &str) -> NodeData {
    let value = match StandardNodeType::parse(node_type) {
        Some(StandardNodeType::Text) => json!({"text": "", "resourceType": "text/plain"}),
        Some(StandardNodeType::Image) => json!({"src": "", "resourceType": "image/png"}),
        Some(StandardNodeType::Video) => json!({"src": "", "resourceType": "video/mp4"}),
        Some(StandardNodeType::Audio) => json!({"src": "", "resourceType": "audio/mp3"}),
        Some(StandardNodeType::Upload) => json!({"src": "", "resourceType": ""}),
        None => json!({}),
    };
    match value {
        serde_json::Value::Object(map) => map,
        _ => NodeData::new(),
    }
}

/// The minimal out-of-the-box configuration
pub fn default_canvas_config() -> CanvasConfig {
    use StandardNodeType::{Image, Text, Upload, Video};

    let def = |t: StandardNodeType, label: &str, component: &str, w: f64, h: f64| {
        NodeDefinition::new(t.as_str(), label, component)
            .with_size(w, h)
            .with_default_data(default_node_data(t.as_str()))
    };

    CanvasConfig {
        node_definitions: vec![
            def(Text, "Text", "TextNode", 280.0, 220.0)
                .allow_targets([Image.as_str(), Video.as_str()]),
            def(Image, "Image", "ImageNode", 260.0, 260.0)
                .allow_sources([Text.as_str(), Upload.as_str()])
                .allow_targets([Video.as_str()]),
            def(Video, "Video", "VideoNode", 300.0, 200.0)
                .allow_sources([Text.as_str(), Image.as_str()]),
            def(Upload, "Upload", "UploadNode", 240.0, 200.0),
        ],
        style: Some(CanvasStyle {
            background: Some("#0f1115".to_string()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_rules() {
        let config = default_canvas_config();
        let text = config.definition("text").unwrap();
        assert_eq!(text.allowed_targets().unwrap(), ["image", "video"]);
        assert!(text.allowed_sources().is_none());

        let upload = config.definition("user-upload").unwrap();
        assert!(upload.connection_rules.is_none());
        assert!(!config.has_node_type("audio"));
    }

    #[test]
    fn test_initial_data() {
        let config = default_canvas_config();
        assert_eq!(config.initial_data("image")["resourceType"], "image/png");
        // Audio has no definition but keeps its built-in defaults
        assert_eq!(config.initial_data("audio")["resourceType"], "audio/mp3");
        assert!(config.initial_data("custom").is_empty());
    }

    #[test]
    fn test_from_json_str() {
        let json = r#"{
            "nodeDefinitions": [
                {"type": "llm", "label": "LLM", "component": "TextNode",
                 "connectionRules": {"allowedSources": ["text"]}}
            ]
        }"#;
        let config = CanvasConfig::from_json_str(json).unwrap();
        assert_eq!(config.label_for("llm"), "LLM");
        assert_eq!(config.label_for("other"), "other");
        assert_eq!(config.definition("llm").unwrap().allowed_sources().unwrap(), ["text"]);
    }

    #[test]
    fn test_duplicate_types_rejected() {
        let json = r#"{"nodeDefinitions": [
            {"type": "a", "label": "A", "component": "X"},
            {"type": "a", "label": "A2", "component": "X"}
        ]}"#;
        assert!(matches!(
            CanvasConfig::from_json_str(json),
            Err(CanvasFlowError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_from_json_file_missing() {
        let result = CanvasConfig::from_json_file("/definitely/not/here.json").await;
        assert!(matches!(result, Err(CanvasFlowError::Io(_))));
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("canvas.json");
        std::fs::write(
            &path,
            r##"{"nodeDefinitions": [{"type": "text", "label": "Prompt", "component": "TextNode"}],
                "style": {"background": "#000"}}"##,
        )
        .unwrap();

        let config = tokio_test::block_on(CanvasConfig::from_json_file(&path)).unwrap();
        assert_eq!(config.label_for("text"), "Prompt");
        assert_eq!(config.style.unwrap().background.as_deref(), Some("#000"));
    }
}
