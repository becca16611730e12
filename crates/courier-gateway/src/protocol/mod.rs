//! Gateway protocol definitions
//!
//! Op codes, the message envelope, close codes and handshake payloads.

mod close_codes;
mod messages;
mod opcodes;
mod payloads;

pub use close_codes::{CloseCode, NORMAL_CLOSE, RESUMABLE_CLOSE};
pub use messages::GatewayMessage;
pub use opcodes::OpCode;
pub use payloads::{
    ConnectionProperties, HelloPayload, IdentifyPayload, PresenceUpdatePayload, ReadyPayload,
    ResumePayload,
};
