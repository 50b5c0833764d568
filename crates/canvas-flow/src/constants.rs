//! Canvas-wide constants
//!
//! Single source of truth for layout fallbacks, timings and reserved keys.

/// Layout fallbacks used when no measured or declared size is known
pub mod sizes {
    /// Node width/height assumed for layout when nothing else is known
    pub const NODE_FALLBACK: f64 = 250.0;
    /// Group width when neither measured nor declared
    pub const GROUP_FALLBACK_WIDTH: f64 = 200.0;
    /// Group height when neither measured nor declared
    pub const GROUP_FALLBACK_HEIGHT: f64 = 100.0;
    /// Per-node size in a group bounding box when no member carries size info
    pub const APPROX_MEMBER_WIDTH: f64 = 200.0;
    pub const APPROX_MEMBER_HEIGHT: f64 = 100.0;
    /// Per-node size in a group bounding box for members missing size info
    pub const BOUNDS_MEMBER_WIDTH: f64 = 200.0;
    pub const BOUNDS_MEMBER_HEIGHT: f64 = 40.0;
}

/// Editor gesture defaults
pub mod editor {
    /// Padding added around member bounds when a group is created
    pub const GROUP_PADDING: f64 = 20.0;
    /// Offset applied to a node dropped from the connection menu so it centers on the pointer
    pub const DROP_OFFSET_X: f64 = 100.0;
    pub const DROP_OFFSET_Y: f64 = 50.0;
    /// Label given to freshly created groups
    pub const NEW_GROUP_LABEL: &str = "New Group";
    /// z-order of group containers (beneath members)
    pub const GROUP_Z_INDEX: i32 = -1;
    /// z-order of regular nodes
    pub const NODE_Z_INDEX: i32 = 10;
}

/// Viewport limits
pub mod viewport {
    pub const MIN_ZOOM: f64 = 0.5;
    pub const MAX_ZOOM: f64 = 2.0;
    /// Fraction of the content box added as margin by fit-view
    pub const FIT_VIEW_PADDING: f64 = 0.1;
}

/// Timing configuration
pub mod timings {
    /// Quiet interval before a node data change is reported to the host
    pub const DATA_CHANGE_DEBOUNCE_MS: u64 = 500;
}

/// Reserved identifiers
pub mod keys {
    /// View node type of group containers
    pub const GROUP_NODE_TYPE: &str = "group";
    /// Legacy node data tag naming an owning group
    pub const LEGACY_GROUP_TAG: &str = "_groupId";
}
