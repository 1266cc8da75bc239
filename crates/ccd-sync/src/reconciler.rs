//! Maps status snapshots onto the dashboard view.

use std::collections::HashMap;

use ccd_types::{
    api::ImageEndpoint,
    geometry::{DisplaySize, SensorRect},
    status::{as_bool, as_f64, CameraStatus, StatusSnapshot, COOLER_ON, CUR_IMAGE_TIME, STATUS_VAL},
    view::{DashboardView, SelectionTarget, SessionFlags, START_COOLER, STOP_COOLER},
};
use chrono::{Local, TimeZone};
use serde_json::Value;
use tracing::debug;

use crate::region::{scale_between, to_display_rect};

/// Last image timestamp already reflected in the view.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Watermark {
    #[default]
    Unset,
    At(f64),
}

impl Watermark {
    /// An image is new when nothing was seen yet or it is more than a second
    /// newer than the watermark.
    pub fn is_new(self, image_time: f64) -> bool {
        match self {
            Watermark::Unset => true,
            Watermark::At(seen) => image_time - seen > 1.0,
        }
    }
}

/// Inputs to one render pass that do not come from the snapshot.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext {
    pub now_ms: i64,
    /// Size of the element the preview image is drawn into.
    pub preview: DisplaySize,
    pub selecting: Option<SelectionTarget>,
}

type FieldRenderer = fn(&mut Reconciler, &Value, &RenderContext) -> String;

pub struct Reconciler {
    base_url: String,
    watermark: Watermark,
    renderers: HashMap<&'static str, FieldRenderer>,
    view: DashboardView,
}

impl Reconciler {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut renderers: HashMap<&'static str, FieldRenderer> = HashMap::new();
        renderers.insert(CUR_IMAGE_TIME, Reconciler::render_image_time);
        renderers.insert(STATUS_VAL, Reconciler::render_status);
        renderers.insert(COOLER_ON, Reconciler::render_cooler);
        Self {
            base_url: base_url.into(),
            watermark: Watermark::Unset,
            renderers,
            view: DashboardView::default(),
        }
    }

    pub fn view(&self) -> &DashboardView {
        &self.view
    }

    pub fn session_mut(&mut self) -> &mut SessionFlags {
        &mut self.view.session
    }

    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    pub fn apply(&mut self, snapshot: &StatusSnapshot, ctx: &RenderContext) -> &DashboardView {
        for (key, value) in snapshot.fields() {
            let render = self
                .renderers
                .get(key.as_str())
                .copied()
                .unwrap_or(Reconciler::render_verbatim as FieldRenderer);
            let text = render(self, value, ctx);
            self.view.fields.insert(key.clone(), text);
        }

        let subframe = snapshot.subframe();
        let roi = snapshot.roi();
        if subframe.is_some() {
            self.view.subframe = subframe;
        }
        if roi.is_some() {
            self.view.roi = roi;
        }
        if let (Some(subframe), Some(roi)) = (subframe, roi) {
            self.update_overlays(subframe, roi, ctx);
        } else {
            debug!("snapshot lacks subframe/ROI geometry; overlays left as they were");
        }
        &self.view
    }

    /// Recomputes overlays from cached geometry, e.g. after the preview was
    /// resized or a selection started or ended.
    pub fn relayout(&mut self, ctx: &RenderContext) -> &DashboardView {
        if let (Some(subframe), Some(roi)) = (self.view.subframe, self.view.roi) {
            self.update_overlays(subframe, roi, ctx);
        } else if ctx.selecting != Some(SelectionTarget::Subframe) {
            self.view.subframe_overlay = None;
        }
        &self.view
    }

    fn update_overlays(&mut self, subframe: SensorRect, roi: SensorRect, ctx: &RenderContext) {
        let Some(scale) = scale_between(ctx.preview, subframe.size_x, subframe.size_y) else {
            debug!("preview or subframe has no extent; overlays skipped");
            return;
        };
        self.view.roi_overlay = Some(to_display_rect(roi, scale));
        self.view.subframe_overlay = (ctx.selecting == Some(SelectionTarget::Subframe)).then(|| {
            // The selector works in subframe-local coordinates.
            to_display_rect(
                SensorRect::new(0, 0, subframe.size_x, subframe.size_y),
                scale,
            )
        });
    }

    fn render_image_time(&mut self, value: &Value, ctx: &RenderContext) -> String {
        let Some(image_time) = as_f64(value) else {
            return verbatim(value);
        };
        let text = format_image_time(image_time, ctx.now_ms, &Local)
            .unwrap_or_else(|| verbatim(value));

        if self.watermark.is_new(image_time) {
            debug!(
                "new image at {} (watermark {:?}); refreshing image URLs",
                image_time, self.watermark
            );
            for endpoint in ImageEndpoint::ALL {
                self.view
                    .image_urls
                    .insert(endpoint, endpoint.url(&self.base_url, ctx.now_ms));
            }
            self.watermark = Watermark::At(image_time);
        }
        text
    }

    fn render_status(&mut self, value: &Value, _ctx: &RenderContext) -> String {
        match CameraStatus::from_value(value) {
            Some(status) => {
                self.view.status = Some(status);
                self.view.capture_enabled = status.capture_allowed();
                status.label()
            }
            None => {
                self.view.status = None;
                self.view.capture_enabled = true;
                format!("Error, code={}", verbatim(value))
            }
        }
    }

    fn render_cooler(&mut self, value: &Value, _ctx: &RenderContext) -> String {
        let active = as_bool(value).unwrap_or(false);
        self.view.cooler_active = active;
        // The label names the next action, not the current state.
        self.view.cooler_label = if active { STOP_COOLER } else { START_COOLER }.into();
        if active { "on" } else { "off" }.into()
    }

    fn render_verbatim(&mut self, value: &Value, _ctx: &RenderContext) -> String {
        verbatim(value)
    }
}

/// `HH:MM:SS (N s old)` where `N = floor(now - image_time)` in seconds.
pub fn format_image_time<Tz>(image_time: f64, now_ms: i64, tz: &Tz) -> Option<String>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let instant = tz
        .timestamp_millis_opt((image_time * 1000.0) as i64)
        .single()?;
    let age = (now_ms as f64 / 1000.0 - image_time).floor() as i64;
    Some(format!("{} ({} s old)", instant.format("%H:%M:%S"), age))
}

fn verbatim(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
