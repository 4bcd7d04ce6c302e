//! Latest observed arm status, folded from telemetry frames.

use chrono::{DateTime, Utc};

use crate::protocol::message::{ArmState, JointAngles, TelemetryFrame};

/// Owned snapshot of what telemetry has told us so far.
///
/// Fields keep their last reported value; a frame that omits a field leaves
/// it untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryState {
    pub joints: Option<JointAngles>,
    pub state: Option<ArmState>,
    pub frames_received: u64,
    pub last_update: Option<DateTime<Utc>>,
}

impl TelemetryState {
    /// Fold one validated frame into the snapshot
    pub fn apply(&mut self, frame: &TelemetryFrame, at: DateTime<Utc>) {
        if let Some(joints) = frame.joints {
            self.joints = Some(joints);
        }
        if let Some(state) = &frame.state {
            self.state = Some(state.clone());
        }
        self.frames_received += 1;
        self.last_update = Some(at);
    }
}
