//! Conversions between sensor pixels and display pixels of a scaled preview.
//!
//! Scale factors are derived on every call from the current display size and
//! the current full extent, so a resized preview is always honoured.

use ccd_types::geometry::{DisplayRect, DisplaySize, Scale, SensorRect};

/// `None` when the full extent is empty or either size is not finite.
pub fn scale_between(displayed: DisplaySize, full_x: i64, full_y: i64) -> Option<Scale> {
    if full_x <= 0 || full_y <= 0 {
        return None;
    }
    let scale = Scale {
        x: displayed.width / full_x as f64,
        y: displayed.height / full_y as f64,
    };
    (scale.x.is_finite() && scale.y.is_finite() && scale.x > 0.0 && scale.y > 0.0)
        .then_some(scale)
}

pub fn to_display_rect(rect: SensorRect, scale: Scale) -> DisplayRect {
    DisplayRect {
        x1: rect.origin_x as f64 * scale.x,
        y1: rect.origin_y as f64 * scale.y,
        x2: (rect.origin_x + rect.size_x) as f64 * scale.x,
        y2: (rect.origin_y + rect.size_y) as f64 * scale.y,
    }
}

/// `base_x`/`base_y` offset the result: zero for ROI updates, the current
/// subframe origin for subframe updates.
pub fn to_sensor_rect(display: DisplayRect, scale: Scale, base_x: i64, base_y: i64) -> SensorRect {
    SensorRect {
        origin_x: base_x + (display.x1 / scale.x).round() as i64,
        origin_y: base_y + (display.y1 / scale.y).round() as i64,
        size_x: ((display.x2 - display.x1) / scale.x).round() as i64,
        size_y: ((display.y2 - display.y1) / scale.y).round() as i64,
    }
}
