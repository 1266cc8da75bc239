use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::SensorRect;

/// Image resources served by the camera server. All are cache-busted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ImageEndpoint {
    Preview,
    Roi,
    RoiCropped,
    FrameHistogram,
    XProfile,
    YProfile,
    RoiHistogram,
    RoiXProfile,
    RoiYProfile,
}

impl ImageEndpoint {
    pub const ALL: [ImageEndpoint; 9] = [
        ImageEndpoint::Preview,
        ImageEndpoint::Roi,
        ImageEndpoint::RoiCropped,
        ImageEndpoint::FrameHistogram,
        ImageEndpoint::XProfile,
        ImageEndpoint::YProfile,
        ImageEndpoint::RoiHistogram,
        ImageEndpoint::RoiXProfile,
        ImageEndpoint::RoiYProfile,
    ];

    pub fn path(self) -> &'static str {
        match self {
            ImageEndpoint::Preview => "/getImage",
            ImageEndpoint::Roi => "/getRoiImage",
            ImageEndpoint::RoiCropped => "/getRoiCroppedImage",
            ImageEndpoint::FrameHistogram => "/getFrameHistogram",
            ImageEndpoint::XProfile => "/getXProfile",
            ImageEndpoint::YProfile => "/getYProfile",
            ImageEndpoint::RoiHistogram => "/getRoiHistogram",
            ImageEndpoint::RoiXProfile => "/getRoiXProfile",
            ImageEndpoint::RoiYProfile => "/getRoiYProfile",
        }
    }

    /// Absolute URL with the cache-busting query `?<bust_ms>`.
    pub fn url(self, base_url: &str, bust_ms: i64) -> String {
        format!(
            "{}{}?{}",
            base_url.trim_end_matches('/'),
            self.path(),
            bust_ms
        )
    }
}

/// Fire-and-forget control requests, each a POST to a path-encoded endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CameraCommand {
    SetCooler(f64),
    SetExposureTime(f64),
    SetSubframe(SensorRect),
    ClearSubframe,
    SetRoi(SensorRect),
    ClearRoi,
    StartExposure,
    StartContinuousExposures,
    StopContinuousExposures,
    SaveImage(String),
    StartAutoSave(String),
    StopAutoSave,
}

impl CameraCommand {
    pub fn path(&self) -> String {
        match self {
            CameraCommand::SetCooler(setpoint) => format!("/setCooler/{setpoint}"),
            CameraCommand::SetExposureTime(seconds) => format!("/setExposureTime/{seconds}"),
            CameraCommand::SetSubframe(rect) => format!("/setSubframe/{rect}"),
            CameraCommand::ClearSubframe => "/clearSubframe/".into(),
            CameraCommand::SetRoi(rect) => format!("/setRoi/{rect}"),
            CameraCommand::ClearRoi => "/clearRoi/".into(),
            CameraCommand::StartExposure => "/startExposure/".into(),
            CameraCommand::StartContinuousExposures => "/startContinuousExposures/".into(),
            CameraCommand::StopContinuousExposures => "/stopContinuousExposures/".into(),
            CameraCommand::SaveImage(name) => format!("/saveImage/{name}"),
            CameraCommand::StartAutoSave(name) => format!("/startAutoSave/{name}"),
            CameraCommand::StopAutoSave => "/stopAutoSave/".into(),
        }
    }
}

impl fmt::Display for CameraCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}
