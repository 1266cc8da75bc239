use std::fmt;

use serde::{Deserialize, Serialize};

/// Rectangle in sensor pixels, as reported by the camera server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorRect {
    pub origin_x: i64,
    pub origin_y: i64,
    pub size_x: i64,
    pub size_y: i64,
}

impl SensorRect {
    pub const fn new(origin_x: i64, origin_y: i64, size_x: i64, size_y: i64) -> Self {
        Self {
            origin_x,
            origin_y,
            size_x,
            size_y,
        }
    }
}

/// Wire encoding used by the subframe/ROI endpoints: `ox,oy:sx,sy`.
impl fmt::Display for SensorRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{}:{},{}",
            self.origin_x, self.origin_y, self.size_x, self.size_y
        )
    }
}

/// Two-corner rectangle in display pixels (the scaled preview).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayRect {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl DisplayRect {
    pub const fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Orders the corners so that `(x1, y1)` is the top-left one.
    pub fn normalized(self) -> Self {
        Self {
            x1: self.x1.min(self.x2),
            y1: self.y1.min(self.y2),
            x2: self.x1.max(self.x2),
            y2: self.y1.max(self.y2),
        }
    }
}

/// Size of the element an image is drawn into, in display pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplaySize {
    pub width: f64,
    pub height: f64,
}

impl DisplaySize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Display pixels per sensor pixel along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    pub x: f64,
    pub y: f64,
}
