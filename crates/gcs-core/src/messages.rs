//! MAVLink command microservice messages.
//!
//! Framing and serialization go through the `mavlink` crate (see `wire`).
//! Inbound payloads are classified here from the raw bytes so that values
//! outside the generated dialect, such as unknown MAV_RESULT codes, survive.
//! Layouts follow the v2 wire order: fields sorted by type size, extensions
//! appended.

use bytes::Buf;

use crate::models::{AckResult, CommandAck, ParamValue, ParamVector};

pub const MSG_ID_COMMAND_INT: u32 = 75;
pub const MSG_ID_COMMAND_LONG: u32 = 76;
pub const MSG_ID_COMMAND_ACK: u32 = 77;
pub const MSG_ID_COMMAND_CANCEL: u32 = 80;

/// COMMAND_LONG (#76)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandLong {
    pub target_system: u8,
    pub target_component: u8,
    pub command: u16,
    pub confirmation: u8,
    pub params: [f32; 7],
}

/// COMMAND_INT (#75)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandInt {
    pub target_system: u8,
    pub target_component: u8,
    pub frame: u8,
    pub command: u16,
    pub current: u8,
    pub autocontinue: u8,
    /// params 1-4
    pub params: [f32; 4],
    pub x: i32,
    pub y: i32,
    pub z: f32,
}

impl CommandInt {
    /// Reassemble the seven-slot vector, keeping x/y as scaled integers.
    pub fn param_vector(&self) -> ParamVector {
        [
            ParamValue::Float(self.params[0]),
            ParamValue::Float(self.params[1]),
            ParamValue::Float(self.params[2]),
            ParamValue::Float(self.params[3]),
            ParamValue::Scaled(self.x),
            ParamValue::Scaled(self.y),
            ParamValue::Float(self.z),
        ]
    }
}

/// COMMAND_CANCEL (#80)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandCancel {
    pub target_system: u8,
    pub target_component: u8,
    pub command: u16,
}

/// Messages this crate can frame and parse.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    CommandLong(CommandLong),
    CommandInt(CommandInt),
    CommandCancel(CommandCancel),
    CommandAck(CommandAck),
}

impl Message {
    pub fn message_id(&self) -> u32 {
        match self {
            Message::CommandInt(_) => MSG_ID_COMMAND_INT,
            Message::CommandLong(_) => MSG_ID_COMMAND_LONG,
            Message::CommandAck(_) => MSG_ID_COMMAND_ACK,
            Message::CommandCancel(_) => MSG_ID_COMMAND_CANCEL,
        }
    }

    /// Command code carried by the message.
    pub fn command(&self) -> u16 {
        match self {
            Message::CommandLong(m) => m.command,
            Message::CommandInt(m) => m.command,
            Message::CommandCancel(m) => m.command,
            Message::CommandAck(m) => m.command,
        }
    }

    /// Parse a payload for a known message id. `payload` may be truncated;
    /// missing trailing bytes read as zero. Returns `None` for other ids.
    pub fn read_payload(message_id: u32, payload: &[u8]) -> Option<Self> {
        let full_len = payload_len(message_id)?;
        let received = payload.len();
        let mut padded = [0u8; MAX_COMMAND_PAYLOAD];
        let take = received.min(full_len);
        padded[..take].copy_from_slice(&payload[..take]);
        let mut buf = &padded[..full_len];

        let message = match message_id {
            MSG_ID_COMMAND_LONG => {
                let mut params = [0f32; 7];
                for param in params.iter_mut() {
                    *param = buf.get_f32_le();
                }
                let command = buf.get_u16_le();
                let target_system = buf.get_u8();
                let target_component = buf.get_u8();
                let confirmation = buf.get_u8();
                Message::CommandLong(CommandLong {
                    target_system,
                    target_component,
                    command,
                    confirmation,
                    params,
                })
            }
            MSG_ID_COMMAND_INT => {
                let mut params = [0f32; 4];
                for param in params.iter_mut() {
                    *param = buf.get_f32_le();
                }
                let x = buf.get_i32_le();
                let y = buf.get_i32_le();
                let z = buf.get_f32_le();
                let command = buf.get_u16_le();
                let target_system = buf.get_u8();
                let target_component = buf.get_u8();
                let frame = buf.get_u8();
                let current = buf.get_u8();
                let autocontinue = buf.get_u8();
                Message::CommandInt(CommandInt {
                    target_system,
                    target_component,
                    frame,
                    command,
                    current,
                    autocontinue,
                    params,
                    x,
                    y,
                    z,
                })
            }
            MSG_ID_COMMAND_ACK => {
                let command = buf.get_u16_le();
                let result = AckResult::from_code(buf.get_u8());
                let progress = buf.get_u8();
                let result_param2 = buf.get_i32_le();
                let target_system = buf.get_u8();
                let target_component = buf.get_u8();
                // Extension fields are optional on the wire
                Message::CommandAck(CommandAck {
                    command,
                    result,
                    progress: (received > 3).then_some(progress),
                    result_param2: (received > 4).then_some(result_param2),
                    target_system: (received > 8).then_some(target_system),
                    target_component: (received > 9).then_some(target_component),
                })
            }
            MSG_ID_COMMAND_CANCEL => {
                let command = buf.get_u16_le();
                let target_system = buf.get_u8();
                let target_component = buf.get_u8();
                Message::CommandCancel(CommandCancel {
                    target_system,
                    target_component,
                    command,
                })
            }
            _ => return None,
        };

        Some(message)
    }
}

const MAX_COMMAND_PAYLOAD: usize = 35;

/// Untruncated payload length of a known message.
pub fn payload_len(message_id: u32) -> Option<usize> {
    match message_id {
        MSG_ID_COMMAND_INT => Some(35),
        MSG_ID_COMMAND_LONG => Some(33),
        MSG_ID_COMMAND_ACK => Some(10),
        MSG_ID_COMMAND_CANCEL => Some(4),
        _ => None,
    }
}
