//! Core data models for command dispatch.

use serde::{Deserialize, Serialize};

/// Number of parameter slots carried by every MAVLink command.
pub const PARAM_SLOTS: usize = 7;

/// MAV_COMP_ID_AUTOPILOT1
pub const COMPONENT_AUTOPILOT: u8 = 1;

/// Addressing of the system/component that should execute a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub system_id: u8,
    /// 0 addresses all components of the system
    pub component_id: u8,
}

impl Target {
    pub fn new(system_id: u8, component_id: u8) -> Self {
        Self {
            system_id,
            component_id,
        }
    }
}

impl Default for Target {
    fn default() -> Self {
        Self::new(1, COMPONENT_AUTOPILOT)
    }
}

/// Coordinate frame of a command (MAV_FRAME).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MavFrame {
    /// WGS84, altitude above mean sea level
    Global,
    /// Local NED relative to the EKF origin
    LocalNed,
    Mission,
    /// WGS84, altitude relative to home
    #[default]
    GlobalRelativeAlt,
    LocalEnu,
    /// WGS84, altitude above terrain
    GlobalTerrainAlt,
    LocalOffsetNed,
    BodyNed,
    BodyOffsetNed,
    BodyFrd,
    LocalFrd,
    LocalFlu,
}

impl MavFrame {
    pub fn code(self) -> u8 {
        match self {
            MavFrame::Global => 0,
            MavFrame::LocalNed => 1,
            MavFrame::Mission => 2,
            MavFrame::GlobalRelativeAlt => 3,
            MavFrame::LocalEnu => 4,
            MavFrame::LocalOffsetNed => 7,
            MavFrame::BodyNed => 8,
            MavFrame::BodyOffsetNed => 9,
            MavFrame::GlobalTerrainAlt => 10,
            MavFrame::BodyFrd => 12,
            MavFrame::LocalFrd => 20,
            MavFrame::LocalFlu => 21,
        }
    }

    /// Map a wire value back to a frame. The deprecated `*_INT` aliases
    /// resolve to their float counterparts.
    pub fn from_code(code: u8) -> Option<Self> {
        let frame = match code {
            0 | 5 => MavFrame::Global,
            1 => MavFrame::LocalNed,
            2 => MavFrame::Mission,
            3 | 6 => MavFrame::GlobalRelativeAlt,
            4 => MavFrame::LocalEnu,
            7 => MavFrame::LocalOffsetNed,
            8 => MavFrame::BodyNed,
            9 => MavFrame::BodyOffsetNed,
            10 | 11 => MavFrame::GlobalTerrainAlt,
            12 => MavFrame::BodyFrd,
            20 => MavFrame::LocalFrd,
            21 => MavFrame::LocalFlu,
            _ => return None,
        };
        Some(frame)
    }

    pub fn is_global(self) -> bool {
        matches!(
            self,
            MavFrame::Global | MavFrame::GlobalRelativeAlt | MavFrame::GlobalTerrainAlt
        )
    }

    /// Scale applied to params 5/6 in COMMAND_INT: degrees * 1e7 for global
    /// frames, metres * 1e4 otherwise.
    pub fn position_scale(self) -> f64 {
        if self.is_global() {
            1e7
        } else {
            1e4
        }
    }
}

/// One transmitted parameter slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamValue {
    Float(f32),
    /// Scaled-integer position (see [`MavFrame::position_scale`])
    Scaled(i32),
}

impl ParamValue {
    pub fn is_float(&self) -> bool {
        matches!(self, ParamValue::Float(_))
    }

    /// Value as the float COMMAND_LONG would carry it.
    pub fn to_f32(self, frame: MavFrame) -> f32 {
        match self {
            ParamValue::Float(value) => value,
            ParamValue::Scaled(raw) => (raw as f64 / frame.position_scale()) as f32,
        }
    }

    /// Value as the scaled integer COMMAND_INT would carry in x/y.
    pub fn to_scaled(self, frame: MavFrame) -> i32 {
        match self {
            ParamValue::Scaled(raw) => raw,
            ParamValue::Float(value) => scale_position(value as f64, frame),
        }
    }
}

impl Default for ParamValue {
    fn default() -> Self {
        ParamValue::Float(0.0)
    }
}

/// Fixed-length parameter vector transmitted with every command.
pub type ParamVector = [ParamValue; PARAM_SLOTS];

/// Scale a position to its COMMAND_INT integer representation.
///
/// NaN maps to 0 and out-of-range values saturate, matching `as` casts.
pub fn scale_position(value: f64, frame: MavFrame) -> i32 {
    (value * frame.position_scale()).round() as i32
}

/// A fully encoded command ready for the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandInvocation {
    pub command: u16,
    pub params: ParamVector,
    /// Only transmitted with the int-form encoding
    pub frame: MavFrame,
    pub target: Target,
    /// 0 for the first transmission, incremented on each retransmission
    pub confirmation: u8,
}

impl CommandInvocation {
    pub fn new(command: u16, params: ParamVector, target: Target) -> Self {
        Self {
            command,
            params,
            frame: MavFrame::default(),
            target,
            confirmation: 0,
        }
    }

    pub fn with_frame(mut self, frame: MavFrame) -> Self {
        self.frame = frame;
        self
    }

    pub fn with_confirmation(mut self, confirmation: u8) -> Self {
        self.confirmation = confirmation;
        self
    }
}

/// Classified outcome of a COMMAND_ACK (MAV_RESULT).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckResult {
    Accepted,
    /// Valid command that cannot run right now; retrying later may work
    TemporarilyRejected,
    Denied,
    Unsupported,
    Failed,
    /// Long-running command still executing; a terminal ack follows
    InProgress,
    Cancelled,
    /// Result code outside the known MAV_RESULT range
    Unknown(u8),
}

impl AckResult {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => AckResult::Accepted,
            1 => AckResult::TemporarilyRejected,
            2 => AckResult::Denied,
            3 => AckResult::Unsupported,
            4 => AckResult::Failed,
            5 => AckResult::InProgress,
            6 => AckResult::Cancelled,
            other => AckResult::Unknown(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            AckResult::Accepted => 0,
            AckResult::TemporarilyRejected => 1,
            AckResult::Denied => 2,
            AckResult::Unsupported => 3,
            AckResult::Failed => 4,
            AckResult::InProgress => 5,
            AckResult::Cancelled => 6,
            AckResult::Unknown(code) => code,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, AckResult::InProgress)
    }

    pub fn is_success(self) -> bool {
        matches!(self, AckResult::Accepted)
    }
}

impl std::fmt::Display for AckResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AckResult::Accepted => write!(f, "Accepted"),
            AckResult::TemporarilyRejected => write!(f, "Temporarily rejected"),
            AckResult::Denied => write!(f, "Denied"),
            AckResult::Unsupported => write!(f, "Unsupported"),
            AckResult::Failed => write!(f, "Failed"),
            AckResult::InProgress => write!(f, "In progress"),
            AckResult::Cancelled => write!(f, "Cancelled"),
            AckResult::Unknown(code) => write!(f, "Unknown result ({})", code),
        }
    }
}

/// Inbound COMMAND_ACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAck {
    pub command: u16,
    pub result: AckResult,
    /// Completion percentage (0-100, 255 = unknown), only meaningful with InProgress
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub result_param2: Option<i32>,
    #[serde(default)]
    pub target_system: Option<u8>,
    #[serde(default)]
    pub target_component: Option<u8>,
}

impl CommandAck {
    pub fn new(command: u16, result: AckResult) -> Self {
        Self {
            command,
            result,
            progress: None,
            result_param2: None,
            target_system: None,
            target_component: None,
        }
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }
}
