//! Frame serialisation.
//!
//! Requests, replies and worker announcements are MessagePack maps produced
//! by `rmp-serde`. Column payloads inside a frame are already in wire units;
//! see [`crate::values`] for the unit conversion that happens before this.

use serde::{Deserialize, Serialize};

use crate::error::NetError;

/// Serialise a frame for the transport.
///
/// # Errors
///
/// [`NetError::Encode`] if the frame cannot be represented.
pub fn encode<T: Serialize>(frame: &T) -> Result<Vec<u8>, NetError> {
    rmp_serde::to_vec_named(frame).map_err(NetError::Encode)
}

/// Parse a frame received from the transport.
///
/// # Errors
///
/// [`NetError::Decode`] on truncated or malformed bytes, or bytes that hold
/// a different frame type.
pub fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, NetError> {
    rmp_serde::from_slice(bytes).map_err(NetError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{CallFrame, Request};
    use bridge_spec::{Column, FunctionId};

    #[test]
    fn test_call_request_survives_encoding() {
        let request = Request::Call(CallFrame {
            call_id: 3,
            function_id: FunctionId::from_name("get_mass"),
            function: "get_mass".to_string(),
            count: 2,
            columns: vec![Column::Int32(vec![1, 2])],
        });
        let bytes = encode(&request).unwrap();
        let restored: Request = decode(&bytes).unwrap();
        assert_eq!(request, restored);
    }

    #[test]
    fn test_decode_invalid_bytes() {
        let result: Result<Request, _> = decode(&[0xFF, 0xFF]);
        assert!(matches!(result, Err(NetError::Decode(_))));
    }
}
