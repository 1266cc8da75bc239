use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    api::ImageEndpoint,
    geometry::{DisplayRect, SensorRect},
    status::CameraStatus,
};

pub const START_COOLER: &str = "Start Cooler";
pub const STOP_COOLER: &str = "Stop Cooler";

/// Which rectangle a drag gesture will update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionTarget {
    Subframe,
    Roi,
}

/// Session flags owned by the sync loop rather than by the camera.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionFlags {
    pub continuous: bool,
    pub autosave: Option<String>,
    /// Control requests sent but not yet completed.
    pub loading: usize,
    pub selecting: Option<SelectionTarget>,
    pub connection_lost: bool,
}

/// Everything the dashboard shows, derived from the latest snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardView {
    /// Rendered text for every snapshot field, keyed by field name.
    pub fields: BTreeMap<String, String>,
    pub status: Option<CameraStatus>,
    pub capture_enabled: bool,
    pub cooler_active: bool,
    pub cooler_label: String,
    pub image_urls: BTreeMap<ImageEndpoint, String>,
    pub subframe: Option<SensorRect>,
    pub roi: Option<SensorRect>,
    pub roi_overlay: Option<DisplayRect>,
    pub subframe_overlay: Option<DisplayRect>,
    pub session: SessionFlags,
}

impl Default for DashboardView {
    fn default() -> Self {
        Self {
            fields: BTreeMap::new(),
            status: None,
            capture_enabled: true,
            cooler_active: false,
            cooler_label: START_COOLER.into(),
            image_urls: BTreeMap::new(),
            subframe: None,
            roi: None,
            roi_overlay: None,
            subframe_overlay: None,
            session: SessionFlags::default(),
        }
    }
}

impl DashboardView {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn image_url(&self, endpoint: ImageEndpoint) -> Option<&str> {
        self.image_urls.get(&endpoint).map(String::as_str)
    }

    /// Plain-text rendering, one `key: value` line per entry.
    pub fn to_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .fields
            .iter()
            .map(|(key, value)| format!("{key}: {value}"))
            .collect();
        lines.push(format!(
            "capture: {}",
            if self.capture_enabled {
                "enabled"
            } else {
                "disabled"
            }
        ));
        lines.push(format!("cooler button: {}", self.cooler_label));
        for (endpoint, url) in &self.image_urls {
            lines.push(format!("{endpoint:?}: {url}"));
        }
        for (name, overlay) in [("roi", self.roi_overlay), ("subframe", self.subframe_overlay)] {
            if let Some(rect) = overlay {
                lines.push(format!(
                    "{name} overlay: ({:.1},{:.1})-({:.1},{:.1})",
                    rect.x1, rect.y1, rect.x2, rect.y2
                ));
            }
        }
        let session = &self.session;
        lines.push(format!(
            "continuous: {}",
            if session.continuous { "on" } else { "off" }
        ));
        lines.push(format!(
            "autosave: {}",
            session.autosave.as_deref().unwrap_or("off")
        ));
        lines.push(format!("pending requests: {}", session.loading));
        if let Some(target) = session.selecting {
            lines.push(format!("selecting: {target:?}"));
        }
        if session.connection_lost {
            lines.push("connection: lost".into());
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_include_overlays_and_session() {
        let view = DashboardView {
            roi_overlay: Some(DisplayRect::new(100.0, 50.0, 150.0, 100.0)),
            subframe_overlay: Some(DisplayRect::new(0.0, 0.0, 400.0, 300.0)),
            session: SessionFlags {
                autosave: Some("image".into()),
                loading: 2,
                selecting: Some(SelectionTarget::Subframe),
                connection_lost: true,
                ..SessionFlags::default()
            },
            ..DashboardView::default()
        };
        let lines = view.to_lines();
        for expected in [
            "capture: enabled",
            "cooler button: Start Cooler",
            "roi overlay: (100.0,50.0)-(150.0,100.0)",
            "subframe overlay: (0.0,0.0)-(400.0,300.0)",
            "continuous: off",
            "autosave: image",
            "pending requests: 2",
            "selecting: Subframe",
            "connection: lost",
        ] {
            assert!(lines.iter().any(|l| l == expected), "missing {expected:?}");
        }
    }
}
