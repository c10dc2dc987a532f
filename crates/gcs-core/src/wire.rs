//! MAVLink v2 framing through the `mavlink` crate.
//!
//! Outbound messages are converted to the ardupilotmega dialect types and
//! written with `mavlink::write_v2_msg`. Inbound bytes are scanned for v2
//! frames carrying one of the command messages; each candidate is checked by
//! `mavlink::read_v2_raw_message` (CRC seeded with the message's CRC_EXTRA)
//! and its raw payload classified by [`Message::read_payload`]. A start byte
//! announcing any other message id is skipped on its own, so line noise never
//! holds back the frames behind it. Outbound frames are never signed; the
//! signature of an inbound signed frame is not verified.

use bytes::{Buf, BytesMut};
use mavlink::ardupilotmega::{
    MavCmd, MavFrame as DialectFrame, MavMessage, MavResult, COMMAND_ACK_DATA,
    COMMAND_CANCEL_DATA, COMMAND_INT_DATA, COMMAND_LONG_DATA,
};
use mavlink::peek_reader::PeekReader;
use mavlink::MavHeader;
use num_traits::FromPrimitive;
use thiserror::Error;

use crate::messages::{payload_len, Message};

pub const MAVLINK_V2_STX: u8 = 0xFD;

const HEADER_LEN: usize = 10;
const CHECKSUM_LEN: usize = 2;
const SIGNATURE_LEN: usize = 13;
const INCOMPAT_FLAG_SIGNED: u8 = 0x01;

/// Sender identity and sequence stamped on a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub sequence: u8,
    pub system_id: u8,
    pub component_id: u8,
}

impl From<FrameHeader> for MavHeader {
    fn from(header: FrameHeader) -> Self {
        MavHeader {
            system_id: header.system_id,
            component_id: header.component_id,
            sequence: header.sequence,
        }
    }
}

/// A checked inbound command frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub header: FrameHeader,
    pub message_id: u32,
    pub message: Message,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("command {0} is not defined by the MAVLink dialect")]
    UnsupportedCommand(u16),
    #[error("coordinate frame {0} is not defined by the MAVLink dialect")]
    UnsupportedFrame(u8),
    #[error("result code {0} is not defined by the MAVLink dialect")]
    UnsupportedResult(u8),
    #[error("failed to serialize message {message_id}: {reason}")]
    Serialize { message_id: u32, reason: String },
}

/// Serialize a message into a complete v2 frame.
pub fn encode_frame(header: FrameHeader, message: &Message) -> Result<Vec<u8>, FrameError> {
    let dialect = to_dialect(message)?;
    let mut frame = Vec::with_capacity(64);
    mavlink::write_v2_msg(&mut frame, header.into(), &dialect).map_err(|err| {
        FrameError::Serialize {
            message_id: message.message_id(),
            reason: format!("{:?}", err),
        }
    })?;
    Ok(frame)
}

fn dialect_command(code: u16) -> Result<MavCmd, FrameError> {
    MavCmd::from_u16(code).ok_or(FrameError::UnsupportedCommand(code))
}

fn to_dialect(message: &Message) -> Result<MavMessage, FrameError> {
    let converted = match message {
        Message::CommandLong(m) => MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
            param1: m.params[0],
            param2: m.params[1],
            param3: m.params[2],
            param4: m.params[3],
            param5: m.params[4],
            param6: m.params[5],
            param7: m.params[6],
            command: dialect_command(m.command)?,
            target_system: m.target_system,
            target_component: m.target_component,
            confirmation: m.confirmation,
        }),
        Message::CommandInt(m) => MavMessage::COMMAND_INT(COMMAND_INT_DATA {
            param1: m.params[0],
            param2: m.params[1],
            param3: m.params[2],
            param4: m.params[3],
            x: m.x,
            y: m.y,
            z: m.z,
            command: dialect_command(m.command)?,
            target_system: m.target_system,
            target_component: m.target_component,
            frame: DialectFrame::from_u8(m.frame).ok_or(FrameError::UnsupportedFrame(m.frame))?,
            current: m.current,
            autocontinue: m.autocontinue,
        }),
        Message::CommandCancel(m) => MavMessage::COMMAND_CANCEL(COMMAND_CANCEL_DATA {
            command: dialect_command(m.command)?,
            target_system: m.target_system,
            target_component: m.target_component,
        }),
        Message::CommandAck(ack) => {
            let code = ack.result.code();
            MavMessage::COMMAND_ACK(COMMAND_ACK_DATA {
                command: dialect_command(ack.command)?,
                result: MavResult::from_u8(code).ok_or(FrameError::UnsupportedResult(code))?,
                progress: ack.progress.unwrap_or(0),
                result_param2: ack.result_param2.unwrap_or(0),
                target_system: ack.target_system.unwrap_or(0),
                target_component: ack.target_component.unwrap_or(0),
            })
        }
    };
    Ok(converted)
}

/// Incremental parser over a byte stream (UDP datagrams, TCP or serial
/// reads).
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
    rejected: u64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes held while waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Command frames that failed their checksum so far.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Next complete command frame, if any.
    pub fn next_frame(&mut self) -> Option<DecodedFrame> {
        loop {
            match self.buf.iter().position(|&b| b == MAVLINK_V2_STX) {
                Some(offset) => self.buf.advance(offset),
                None => {
                    self.buf.clear();
                    return None;
                }
            }
            if self.buf.len() < HEADER_LEN {
                return None;
            }

            let len = self.buf[1] as usize;
            let message_id = u32::from_le_bytes([self.buf[7], self.buf[8], self.buf[9], 0]);
            match payload_len(message_id) {
                Some(max) if len <= max => {}
                // Not a command frame, or a length no command frame can have
                _ => {
                    self.buf.advance(1);
                    continue;
                }
            }

            let signed = self.buf[2] & INCOMPAT_FLAG_SIGNED != 0;
            let frame_len = HEADER_LEN + len + CHECKSUM_LEN + if signed { SIGNATURE_LEN } else { 0 };
            if self.buf.len() < frame_len {
                return None;
            }

            let parsed = {
                let mut reader = PeekReader::new(&self.buf[..frame_len]);
                mavlink::read_v2_raw_message::<MavMessage, _>(&mut reader)
            };
            match parsed {
                // The reader resyncs by itself; only a frame that starts at
                // this start byte counts
                Ok(raw) if raw.header() == &self.buf[1..HEADER_LEN] => {
                    let header = FrameHeader {
                        sequence: raw.sequence(),
                        system_id: raw.system_id(),
                        component_id: raw.component_id(),
                    };
                    let message = Message::read_payload(message_id, raw.payload());
                    self.buf.advance(frame_len);
                    if let Some(message) = message {
                        return Some(DecodedFrame {
                            header,
                            message_id,
                            message,
                        });
                    }
                }
                _ => {
                    self.rejected += 1;
                    self.buf.advance(1);
                }
            }
        }
    }
}
