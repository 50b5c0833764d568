//! Screen <-> canvas transform

use serde::{Deserialize, Serialize};

use crate::constants::viewport::{FIT_VIEW_PADDING, MAX_ZOOM, MIN_ZOOM};
use crate::types::{Position, Rect, Size};

/// Pan offset (screen pixels) and zoom factor of the hosted view
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

impl Viewport {
    pub fn new(x: f64, y: f64, zoom: f64) -> Self {
        Self {
            x,
            y,
            zoom: clamp_zoom(zoom),
        }
    }

    /// Convert a screen point to canvas coordinates
    pub fn screen_to_flow(&self, screen: Position) -> Position {
        Position::new((screen.x - self.x) / self.zoom, (screen.y - self.y) / self.zoom)
    }

    /// Convert a canvas point to screen coordinates
    pub fn flow_to_screen(&self, flow: Position) -> Position {
        Position::new(flow.x * self.zoom + self.x, flow.y * self.zoom + self.y)
    }

    /// Viewport that centers `bounds` inside a view of `view_size`
    ///
    /// An empty box only gets centered, at zoom 1.
    pub fn fit(bounds: Rect, view_size: Size) -> Self {
        let padded_w = bounds.width * (1.0 + 2.0 * FIT_VIEW_PADDING);
        let padded_h = bounds.height * (1.0 + 2.0 * FIT_VIEW_PADDING);

        let zoom = if padded_w > 0.0 && padded_h > 0.0 {
            clamp_zoom((view_size.width / padded_w).min(view_size.height / padded_h))
        } else {
            1.0
        };

        let center_x = bounds.x + bounds.width / 2.0;
        let center_y = bounds.y + bounds.height / 2.0;
        Self {
            x: view_size.width / 2.0 - center_x * zoom,
            y: view_size.height / 2.0 - center_y * zoom,
            zoom,
        }
    }
}

/// Non-finite zoom falls back to 1
fn clamp_zoom(zoom: f64) -> f64 {
    if !zoom.is_finite() {
        return 1.0;
    }
    zoom.clamp(MIN_ZOOM, MAX_ZOOM)
}
