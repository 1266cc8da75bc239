use ccd_types::{
    api::CameraCommand,
    geometry::{DisplayRect, DisplaySize, SensorRect},
    view::SelectionTarget,
};
use tracing::warn;

use crate::region::{scale_between, to_sensor_rect};

/// Drag-select mode. Polling is suspended while `Selecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectMode {
    #[default]
    Polling,
    Selecting(SelectionTarget),
}

/// Result of finishing a gesture. `command` is `None` when the subframe
/// geometry is unknown or has no extent.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionOutcome {
    pub target: SelectionTarget,
    pub command: Option<CameraCommand>,
}

impl SelectMode {
    pub fn target(self) -> Option<SelectionTarget> {
        match self {
            SelectMode::Polling => None,
            SelectMode::Selecting(target) => Some(target),
        }
    }

    /// Returns `true` when the mode changed and the poller must be suspended.
    pub fn begin(&mut self, target: SelectionTarget) -> bool {
        match self {
            SelectMode::Polling => {
                *self = SelectMode::Selecting(target);
                true
            }
            SelectMode::Selecting(current) => {
                warn!("selection of {:?} already in progress", current);
                false
            }
        }
    }

    /// Returns `true` when the mode changed and polling must resume.
    pub fn cancel(&mut self) -> bool {
        let was_selecting = matches!(self, SelectMode::Selecting(_));
        *self = SelectMode::Polling;
        was_selecting
    }

    /// Consumes the selection rectangle. `subframe` is the currently known
    /// subframe; `preview` the size the gesture was made over.
    pub fn complete(
        &mut self,
        selection: DisplayRect,
        subframe: Option<SensorRect>,
        preview: DisplaySize,
    ) -> Option<SelectionOutcome> {
        let SelectMode::Selecting(target) = *self else {
            return None;
        };
        *self = SelectMode::Polling;

        let selection = selection.normalized();
        let command = subframe
            .and_then(|sub| {
                let scale = scale_between(preview, sub.size_x, sub.size_y)?;
                Some(match target {
                    SelectionTarget::Subframe => CameraCommand::SetSubframe(to_sensor_rect(
                        selection,
                        scale,
                        sub.origin_x,
                        sub.origin_y,
                    )),
                    SelectionTarget::Roi => {
                        CameraCommand::SetRoi(to_sensor_rect(selection, scale, 0, 0))
                    }
                })
            });
        if command.is_none() {
            warn!("no subframe geometry known yet; {:?} selection dropped", target);
        }
        Some(SelectionOutcome { target, command })
    }
}
