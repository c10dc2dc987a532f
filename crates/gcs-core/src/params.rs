//! Parameter encoder.
//!
//! Maps a command's bound arguments onto the fixed seven-slot vector,
//! filling reserved slots with their declared constants.

use crate::catalog::{CommandDefinition, SlotSpec};
use crate::encoding::Encoding;
use crate::error::CommandError;
use crate::models::{scale_position, CommandInvocation, ParamValue, ParamVector, Target};

/// Zero-based indices of params 5 and 6, the x/y positions of COMMAND_INT.
const POSITION_SLOTS: [usize; 2] = [4, 5];

/// Encode with the definition's declared encoding.
pub fn encode_params(
    definition: &CommandDefinition,
    values: &[f64],
) -> Result<ParamVector, CommandError> {
    encode_params_as(definition, values, definition.encoding)
}

/// Encode for an explicit encoding. Int-form scales params 5 and 6 using the
/// definition's frame; nothing else is converted.
pub fn encode_params_as(
    definition: &CommandDefinition,
    values: &[f64],
    encoding: Encoding,
) -> Result<ParamVector, CommandError> {
    let expected = definition.bound_count();
    if values.len() != expected {
        return Err(CommandError::InvalidArgumentCount {
            command: definition.name.clone(),
            expected,
            actual: values.len(),
        });
    }

    let mut params = ParamVector::default();
    let mut bound = values.iter();

    for (index, slot) in definition.slots().enumerate() {
        let value = match slot {
            SlotSpec::Reserved { reserved } => reserved as f64,
            // Arity was checked above
            SlotSpec::Bound { .. } => bound.next().copied().unwrap_or_default(),
        };

        params[index] = if encoding == Encoding::IntForm && POSITION_SLOTS.contains(&index) {
            ParamValue::Scaled(scale_position(value, definition.frame))
        } else {
            ParamValue::Float(value as f32)
        };
    }

    Ok(params)
}

/// Builds invocations from catalog definitions for one target.
#[derive(Debug, Clone, Copy)]
pub struct Encoder {
    target: Target,
}

impl Encoder {
    pub fn new(target: Target) -> Self {
        Self { target }
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn encode(
        &self,
        definition: &CommandDefinition,
        values: &[f64],
    ) -> Result<CommandInvocation, CommandError> {
        self.encode_with(definition, values, None)
    }

    /// Encode, optionally overriding the catalog's encoding for this call.
    pub fn encode_with(
        &self,
        definition: &CommandDefinition,
        values: &[f64],
        encoding: Option<Encoding>,
    ) -> Result<CommandInvocation, CommandError> {
        let encoding = encoding.unwrap_or(definition.encoding);
        let params = encode_params_as(definition, values, encoding)?;
        Ok(CommandInvocation::new(definition.code, params, self.target)
            .with_frame(definition.frame))
    }
}
