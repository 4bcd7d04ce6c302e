//! # Arm Geometry
//!
//! Fixed facts about the six-joint desk arm: joint names, safe angle ranges,
//! the neutral pose and the idle animations built into the firmware.

use std::fmt;
use std::str::FromStr;

use crate::protocol::message::{JointAngles, JOINT_COUNT};

/// Joint names, base first
pub const JOINT_NAMES: [&str; JOINT_COUNT] =
    ["Base", "Shoulder", "Elbow", "Wrist Pitch", "Wrist Roll", "Gripper"];

/// Inclusive (min, max) angle per joint in degrees
pub const JOINT_LIMITS: [(f64, f64); JOINT_COUNT] = [
    (0.0, 180.0),  // Base
    (15.0, 165.0), // Shoulder
    (0.0, 180.0),  // Elbow
    (30.0, 150.0), // Wrist Pitch
    (0.0, 180.0),  // Wrist Roll
    (10.0, 90.0),  // Gripper
];

/// Pose the firmware starts in
pub const NEUTRAL_POSE: JointAngles = [90.0, 45.0, 120.0, 90.0, 0.0, 30.0];

/// Speed scalar used when none is given
pub const DEFAULT_SPEED: f64 = 0.5;

/// Clamp each target into its joint's range
///
/// Returns the clamped angles and whether anything changed. A NaN target
/// becomes the joint's minimum.
pub fn clamp_to_limits(targets: &JointAngles) -> (JointAngles, bool) {
    let mut clamped = *targets;
    let mut changed = false;
    for (angle, (min, max)) in clamped.iter_mut().zip(JOINT_LIMITS) {
        let limited = if angle.is_nan() { min } else { angle.clamp(min, max) };
        if angle.is_nan() || limited != *angle {
            *angle = limited;
            changed = true;
        }
    }
    (clamped, changed)
}

/// Idle animations the controller can play
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleAnimation {
    Breathing,
    CuriousTilt,
    MicroAdjust,
    /// Return to the neutral pose
    IdleReset,
}

impl IdleAnimation {
    pub const ALL: [IdleAnimation; 4] = [
        IdleAnimation::Breathing,
        IdleAnimation::CuriousTilt,
        IdleAnimation::MicroAdjust,
        IdleAnimation::IdleReset,
    ];

    /// Name sent on the wire
    pub fn as_str(self) -> &'static str {
        match self {
            IdleAnimation::Breathing => "breathing",
            IdleAnimation::CuriousTilt => "curious_tilt",
            IdleAnimation::MicroAdjust => "micro_adjust",
            IdleAnimation::IdleReset => "idle_reset",
        }
    }
}

impl fmt::Display for IdleAnimation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdleAnimation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IdleAnimation::ALL
            .into_iter()
            .find(|animation| animation.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = IdleAnimation::ALL.iter().map(|a| a.as_str()).collect();
                format!("unknown animation '{}', expected one of: {}", s, known.join(", "))
            })
    }
}
