pub mod catalog;
pub mod encoding;
pub mod error;
pub mod messages;
pub mod mode;
pub mod models;
pub mod params;
pub mod wire;

pub use catalog::{CommandCatalog, CommandDefinition, ParamKind, SlotSpec};
pub use encoding::{build_message, select_encoding, Encoding};
pub use error::{CatalogError, CommandError};
pub use messages::{CommandCancel, CommandInt, CommandLong, Message};
pub use mode::FlightMode;
pub use models::{
    scale_position, AckResult, CommandAck, CommandInvocation, MavFrame, ParamValue, ParamVector,
    Target, COMPONENT_AUTOPILOT, PARAM_SLOTS,
};
pub use params::{encode_params, encode_params_as, Encoder};
pub use wire::{encode_frame, DecodedFrame, FrameDecoder, FrameError, FrameHeader};
