//! Encoding and decoding of packet bodies.
//!
//! Every body on the wire is a protobuf message whose shape is selected by
//! the enclosing [`Packet`](crate::Packet)'s type. These two functions are
//! the only place the crate touches `prost` encoding directly, so callers
//! deal with [`ProtocolError`] regardless of which message they decode.

use prost::Message;

use crate::ProtocolError;

/// Serializes a message into a freshly allocated buffer.
///
/// Protobuf encoding into a `Vec` can't fail (the buffer grows as needed),
/// so unlike [`decode_message`] this returns the bytes directly.
pub fn encode_message<M: Message>(message: &M) -> Vec<u8> {
    message.encode_to_vec()
}

/// Deserializes bytes into the expected message shape.
///
/// # Errors
/// Returns [`ProtocolError::Decode`] if the bytes are malformed or don't
/// match `M`.
pub fn decode_message<M: Message + Default>(
    data: &[u8],
) -> Result<M, ProtocolError> {
    M::decode(data).map_err(ProtocolError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Ack, Get, Messages, Sub};

    #[test]
    fn test_ack_round_trip_keeps_error_fields() {
        let ack = Ack {
            error_code: Some(403),
            error_message: "denied".into(),
        };
        let decoded: Ack = decode_message(&encode_message(&ack)).unwrap();
        assert_eq!(decoded, ack);
        assert_eq!(decoded.code(), 403);
    }

    #[test]
    fn test_absent_optional_field_is_not_zero() {
        // An Ack without an error code must still decode as "present: no",
        // so the default-when-absent rule stays explicit.
        let ack = Ack {
            error_code: None,
            error_message: String::new(),
        };
        let bytes = encode_message(&ack);
        assert!(bytes.is_empty(), "proto3 omits absent fields");
        let decoded: Ack = decode_message(&bytes).unwrap();
        assert_eq!(decoded.error_code, None);
        assert_eq!(decoded.code(), 0);
    }

    #[test]
    fn test_get_keeps_negative_timeout() {
        let get = Get {
            destination: "example".into(),
            client_id: "1001".into(),
            fetch_size: 10,
            timeout: Some(-1),
            unit: Some(2),
            auto_ack: Some(false),
        };
        let decoded: Get = decode_message(&encode_message(&get)).unwrap();
        assert_eq!(decoded.timeout, Some(-1));
        assert_eq!(decoded.auto_ack, Some(false));
    }

    #[test]
    fn test_messages_preserve_payload_order() {
        let messages = Messages {
            batch_id: 7,
            messages: vec![b"first".to_vec(), Vec::new(), b"third".to_vec()],
        };
        let decoded: Messages =
            decode_message(&encode_message(&messages)).unwrap();
        assert_eq!(decoded.batch_id, 7);
        assert_eq!(decoded.messages.len(), 3);
        assert_eq!(decoded.messages[2], b"third");
    }

    #[test]
    fn test_decode_garbage_fails() {
        // 0x0A declares a length-delimited field 1 with a length that
        // runs past the end of the buffer.
        let result: Result<Sub, _> = decode_message(&[0x0A, 0x10, 0x01]);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
