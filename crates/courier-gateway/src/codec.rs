//! Frame codec

use crate::error::CodecError;
use crate::protocol::GatewayMessage;
use crate::transport::Frame;

/// Turns transport frames into gateway messages and back
pub trait FrameCodec: Send + Sync + 'static {
    fn decode(&self, frame: &Frame) -> Result<GatewayMessage, CodecError>;

    fn encode(&self, message: &GatewayMessage) -> Result<Frame, CodecError>;
}

/// JSON encoding (`encoding=json`)
///
/// Accepts text frames and binary frames holding UTF-8 JSON; always encodes to text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl FrameCodec for JsonCodec {
    fn decode(&self, frame: &Frame) -> Result<GatewayMessage, CodecError> {
        let text = match frame {
            Frame::Text(text) => text.as_str(),
            Frame::Binary(bytes) => std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?,
        };

        Ok(GatewayMessage::from_json(text)?)
    }

    fn encode(&self, message: &GatewayMessage) -> Result<Frame, CodecError> {
        Ok(Frame::Text(message.to_json()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OpCode;

    #[test]
    fn test_decode_text_and_binary() {
        let codec = JsonCodec;
        let raw = r#"{"op":11,"d":null}"#;

        let text = codec.decode(&Frame::Text(raw.to_string())).unwrap();
        let binary = codec.decode(&Frame::Binary(raw.as_bytes().to_vec())).unwrap();

        assert_eq!(text.op, OpCode::HeartbeatAck);
        assert_eq!(text, binary);
    }

    #[test]
    fn test_decode_errors() {
        let codec = JsonCodec;

        assert!(matches!(
            codec.decode(&Frame::Text("{not json".to_string())),
            Err(CodecError::Json(_))
        ));
        assert!(matches!(
            codec.decode(&Frame::Binary(vec![0xff, 0xfe])),
            Err(CodecError::InvalidUtf8)
        ));
        // Unknown op code
        assert!(codec.decode(&Frame::Text(r#"{"op":42}"#.to_string())).is_err());
    }

    #[test]
    fn test_encode() {
        let frame = JsonCodec.encode(&GatewayMessage::heartbeat(Some(7))).unwrap();
        assert_eq!(frame, Frame::Text(r#"{"op":1,"d":7}"#.to_string()));
    }
}
