//! Transport selection between COMMAND_LONG and COMMAND_INT.

use serde::{Deserialize, Serialize};

use crate::messages::{CommandInt, CommandLong, Message};
use crate::models::{CommandInvocation, ParamValue, ParamVector};

/// Wire encoding of a command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Encoding {
    /// COMMAND_LONG: seven float parameters
    #[default]
    #[serde(rename = "long")]
    LongForm,
    /// COMMAND_INT: frame plus scaled-integer x/y
    #[serde(rename = "int")]
    IntForm,
}

/// Pick the encoding from params 6 and 7: float in both means COMMAND_LONG,
/// a scaled integer in either means COMMAND_INT.
pub fn select_encoding(params: &ParamVector) -> Encoding {
    if params[5].is_float() && params[6].is_float() {
        Encoding::LongForm
    } else {
        Encoding::IntForm
    }
}

/// Build the outbound message for an invocation.
pub fn build_message(invocation: &CommandInvocation) -> Message {
    let frame = invocation.frame;
    let params = &invocation.params;

    match select_encoding(params) {
        Encoding::LongForm => Message::CommandLong(CommandLong {
            target_system: invocation.target.system_id,
            target_component: invocation.target.component_id,
            command: invocation.command,
            confirmation: invocation.confirmation,
            params: params.map(|p| p.to_f32(frame)),
        }),
        Encoding::IntForm => Message::CommandInt(CommandInt {
            target_system: invocation.target.system_id,
            target_component: invocation.target.component_id,
            frame: frame.code(),
            command: invocation.command,
            current: 0,
            autocontinue: 0,
            params: [
                params[0].to_f32(frame),
                params[1].to_f32(frame),
                params[2].to_f32(frame),
                params[3].to_f32(frame),
            ],
            x: params[4].to_scaled(frame),
            y: params[5].to_scaled(frame),
            z: params[6].to_f32(frame),
        }),
    }
}
