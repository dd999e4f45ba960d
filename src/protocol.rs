// Binary wire protocol: framing constants, request/response types, codec

use thiserror::Error;

// ----------------------------------------------------------------------------
// Protocol constants
// ----------------------------------------------------------------------------

/// Protocol version carried in every header, both directions
pub const PROTOCOL_VERSION: u8 = 2;

/// Size of a client identifier
pub const CLIENT_ID_LEN: usize = 16;

/// Size of the fixed, NUL-padded name field
pub const NAME_LEN: usize = 255;

/// Size of a client public key blob
pub const PUBLIC_KEY_LEN: usize = 160;

/// Request header: client id (16) | version (1) | code (2) | payload size (4)
pub const REQUEST_HEADER_LEN: usize = CLIENT_ID_LEN + 1 + 2 + 4;

/// Response header: version (1) | code (2) | payload size (4)
pub const RESPONSE_HEADER_LEN: usize = 1 + 2 + 4;

/// Fixed prefix of a SEND_MESSAGE payload: recipient (16) | type (1) | content size (4)
pub const MESSAGE_HEADER_LEN: usize = CLIENT_ID_LEN + 1 + 4;

/// Opaque 16-byte client identifier
pub type ClientId = [u8; CLIENT_ID_LEN];

// ----------------------------------------------------------------------------
// Request / response codes
// ----------------------------------------------------------------------------

/// Operations a client may request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum RequestCode {
    /// Register a new identity with a name and public key
    Register = 600,
    /// List all other registered clients
    ClientList = 601,
    /// Fetch the public key of a specific client
    PublicKey = 602,
    /// Deposit a message for a recipient
    SendMessage = 603,
    /// Drain all messages addressed to the caller
    PendingMessages = 604,
}

impl RequestCode {
    /// Convert from the raw wire value
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            600 => Some(RequestCode::Register),
            601 => Some(RequestCode::ClientList),
            602 => Some(RequestCode::PublicKey),
            603 => Some(RequestCode::SendMessage),
            604 => Some(RequestCode::PendingMessages),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Response codes mirroring each success case plus a single error code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ResponseCode {
    Registered = 2100,
    ClientList = 2101,
    PublicKey = 2102,
    MessageQueued = 2103,
    PendingMessages = 2104,
    Error = 9000,
}

impl ResponseCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

// ----------------------------------------------------------------------------
// Errors
// ----------------------------------------------------------------------------

/// Decode failures, always answered with a generic error response
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed header: {0}")]
    MalformedHeader(&'static str),
    #[error("malformed payload: {0}")]
    MalformedPayload(&'static str),
}

// ----------------------------------------------------------------------------
// Structured requests and responses
// ----------------------------------------------------------------------------

/// Decoded fixed-size request header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub client_id: ClientId,
    pub version: u8,
    pub code: RequestCode,
    pub payload_size: u32,
}

/// Decoded request payload, shape depending on the request code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Register {
        name: String,
        public_key: [u8; PUBLIC_KEY_LEN],
    },
    ClientList,
    PublicKey {
        target: ClientId,
    },
    SendMessage {
        recipient: ClientId,
        msg_type: u8,
        content: Vec<u8>,
    },
    PendingMessages,
}

/// One complete decoded request frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub header: RequestHeader,
    pub body: RequestBody,
}

/// A response ready for encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: ResponseCode,
    pub payload: Vec<u8>,
}

impl Response {
    /// The generic error response: header only, empty payload
    pub fn error() -> Self {
        Self {
            code: ResponseCode::Error,
            payload: Vec::new(),
        }
    }
}

// ----------------------------------------------------------------------------
// Decoding
// ----------------------------------------------------------------------------

/// Decode a fixed-size request header.
///
/// `max_payload` bounds the declared payload size; anything above it is
/// rejected before any payload byte is read.
pub fn decode_header(bytes: &[u8], max_payload: u32) -> Result<RequestHeader, ProtocolError> {
    if bytes.len() < REQUEST_HEADER_LEN {
        return Err(ProtocolError::MalformedHeader("short header"));
    }

    let mut client_id = [0u8; CLIENT_ID_LEN];
    client_id.copy_from_slice(&bytes[..CLIENT_ID_LEN]);

    let version = bytes[CLIENT_ID_LEN];
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::MalformedHeader("unsupported protocol version"));
    }

    let code_raw = u16::from_le_bytes([bytes[17], bytes[18]]);
    let code = RequestCode::from_u16(code_raw)
        .ok_or(ProtocolError::MalformedHeader("unknown request code"))?;

    let payload_size = u32::from_le_bytes([bytes[19], bytes[20], bytes[21], bytes[22]]);
    if payload_size > max_payload {
        return Err(ProtocolError::MalformedHeader("declared payload too large"));
    }

    Ok(RequestHeader {
        client_id,
        version,
        code,
        payload_size,
    })
}

/// Decode a request payload according to its request code.
///
/// Pure and store-free; size mismatches are reported, never padded or
/// truncated.
pub fn decode_payload(code: RequestCode, payload: &[u8]) -> Result<RequestBody, ProtocolError> {
    match code {
        RequestCode::Register => {
            if payload.len() != NAME_LEN + PUBLIC_KEY_LEN {
                return Err(ProtocolError::MalformedPayload(
                    "registration payload must be name + public key",
                ));
            }
            let name = decode_name(&payload[..NAME_LEN])?;
            let mut public_key = [0u8; PUBLIC_KEY_LEN];
            public_key.copy_from_slice(&payload[NAME_LEN..]);
            Ok(RequestBody::Register { name, public_key })
        }
        RequestCode::ClientList => {
            if !payload.is_empty() {
                return Err(ProtocolError::MalformedPayload(
                    "client list request carries no payload",
                ));
            }
            Ok(RequestBody::ClientList)
        }
        RequestCode::PublicKey => {
            let target: ClientId = payload
                .try_into()
                .map_err(|_| ProtocolError::MalformedPayload("target id must be 16 bytes"))?;
            Ok(RequestBody::PublicKey { target })
        }
        RequestCode::SendMessage => {
            if payload.len() < MESSAGE_HEADER_LEN {
                return Err(ProtocolError::MalformedPayload("truncated message header"));
            }
            let mut recipient = [0u8; CLIENT_ID_LEN];
            recipient.copy_from_slice(&payload[..CLIENT_ID_LEN]);
            let msg_type = payload[CLIENT_ID_LEN];
            let content_size = u32::from_le_bytes([
                payload[17],
                payload[18],
                payload[19],
                payload[20],
            ]) as usize;
            let content = &payload[MESSAGE_HEADER_LEN..];
            if content.len() != content_size {
                return Err(ProtocolError::MalformedPayload(
                    "content size does not match payload",
                ));
            }
            if content.is_empty() {
                return Err(ProtocolError::MalformedPayload("empty message content"));
            }
            Ok(RequestBody::SendMessage {
                recipient,
                msg_type,
                content: content.to_vec(),
            })
        }
        RequestCode::PendingMessages => {
            if !payload.is_empty() {
                return Err(ProtocolError::MalformedPayload(
                    "pending messages request carries no payload",
                ));
            }
            Ok(RequestBody::PendingMessages)
        }
    }
}

/// Decode a fixed NUL-padded name field
fn decode_name(field: &[u8]) -> Result<String, ProtocolError> {
    let end = field
        .iter()
        .position(|&b| b == 0)
        .ok_or(ProtocolError::MalformedPayload("name is not NUL terminated"))?;
    if end == 0 {
        return Err(ProtocolError::MalformedPayload("empty name"));
    }
    if field[end..].iter().any(|&b| b != 0) {
        return Err(ProtocolError::MalformedPayload("garbage after name terminator"));
    }
    let name = &field[..end];
    if !name.is_ascii() {
        return Err(ProtocolError::MalformedPayload("name is not ASCII"));
    }
    Ok(String::from_utf8_lossy(name).into_owned())
}

// ----------------------------------------------------------------------------
// Encoding
// ----------------------------------------------------------------------------

/// Encode a response to wire bytes: fixed header followed by the payload.
///
/// Total length is always `RESPONSE_HEADER_LEN + payload.len()`.
pub fn encode(response: &Response) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(RESPONSE_HEADER_LEN + response.payload.len());
    bytes.push(PROTOCOL_VERSION);
    bytes.extend_from_slice(&response.code.as_u16().to_le_bytes());
    bytes.extend_from_slice(&(response.payload.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&response.payload);
    bytes
}

/// Pad a name into its fixed wire field
pub fn encode_name(name: &str) -> [u8; NAME_LEN] {
    let mut field = [0u8; NAME_LEN];
    let bytes = name.as_bytes();
    // Always leaves at least one trailing NUL
    let len = bytes.len().min(NAME_LEN - 1);
    field[..len].copy_from_slice(&bytes[..len]);
    field
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: u32 = 1024 * 1024;

    fn header_bytes(client_id: &ClientId, version: u8, code: u16, payload_size: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(client_id);
        bytes.push(version);
        bytes.extend_from_slice(&code.to_le_bytes());
        bytes.extend_from_slice(&payload_size.to_le_bytes());
        bytes
    }

    #[test]
    fn test_decode_header() {
        let id = [7u8; 16];
        let bytes = header_bytes(&id, PROTOCOL_VERSION, 601, 0);
        let header = decode_header(&bytes, MAX).unwrap();

        assert_eq!(header.client_id, id);
        assert_eq!(header.code, RequestCode::ClientList);
        assert_eq!(header.payload_size, 0);
    }

    #[test]
    fn test_decode_header_rejects_bad_version() {
        let bytes = header_bytes(&[0u8; 16], 1, 601, 0);
        assert_eq!(
            decode_header(&bytes, MAX),
            Err(ProtocolError::MalformedHeader("unsupported protocol version"))
        );
    }

    #[test]
    fn test_decode_header_rejects_unknown_code() {
        let bytes = header_bytes(&[0u8; 16], PROTOCOL_VERSION, 999, 0);
        assert!(matches!(
            decode_header(&bytes, MAX),
            Err(ProtocolError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_decode_header_rejects_oversized_payload() {
        let bytes = header_bytes(&[0u8; 16], PROTOCOL_VERSION, 600, MAX + 1);
        assert_eq!(
            decode_header(&bytes, MAX),
            Err(ProtocolError::MalformedHeader("declared payload too large"))
        );
    }

    #[test]
    fn test_decode_register_payload() {
        let mut payload = encode_name("alice").to_vec();
        payload.extend_from_slice(&[0xAB; PUBLIC_KEY_LEN]);

        let body = decode_payload(RequestCode::Register, &payload).unwrap();
        match body {
            RequestBody::Register { name, public_key } => {
                assert_eq!(name, "alice");
                assert_eq!(public_key, [0xAB; PUBLIC_KEY_LEN]);
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[test]
    fn test_decode_register_rejects_unterminated_name() {
        let mut payload = vec![b'x'; NAME_LEN];
        payload.extend_from_slice(&[0u8; PUBLIC_KEY_LEN]);
        assert!(decode_payload(RequestCode::Register, &payload).is_err());
    }

    #[test]
    fn test_decode_register_rejects_wrong_size() {
        let payload = vec![0u8; 10];
        assert!(decode_payload(RequestCode::Register, &payload).is_err());
    }

    #[test]
    fn test_decode_send_message_payload() {
        let recipient = [3u8; 16];
        let content = b"hello there";
        let mut payload = recipient.to_vec();
        payload.push(3);
        payload.extend_from_slice(&(content.len() as u32).to_le_bytes());
        payload.extend_from_slice(content);

        let body = decode_payload(RequestCode::SendMessage, &payload).unwrap();
        match body {
            RequestBody::SendMessage {
                recipient: r,
                msg_type,
                content: c,
            } => {
                assert_eq!(r, recipient);
                assert_eq!(msg_type, 3);
                assert_eq!(c, content);
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[test]
    fn test_decode_send_message_rejects_size_mismatch() {
        let mut payload = [0u8; 16].to_vec();
        payload.push(1);
        payload.extend_from_slice(&100u32.to_le_bytes());
        payload.extend_from_slice(b"short");
        assert_eq!(
            decode_payload(RequestCode::SendMessage, &payload),
            Err(ProtocolError::MalformedPayload("content size does not match payload"))
        );
    }

    #[test]
    fn test_decode_send_message_rejects_empty_content() {
        let mut payload = [0u8; 16].to_vec();
        payload.push(1);
        payload.extend_from_slice(&0u32.to_le_bytes());
        assert_eq!(
            decode_payload(RequestCode::SendMessage, &payload),
            Err(ProtocolError::MalformedPayload("empty message content"))
        );
    }

    #[test]
    fn test_decode_empty_payload_codes_reject_data() {
        assert!(decode_payload(RequestCode::ClientList, b"x").is_err());
        assert!(decode_payload(RequestCode::PendingMessages, b"x").is_err());
        assert!(decode_payload(RequestCode::ClientList, b"").is_ok());
        assert!(decode_payload(RequestCode::PendingMessages, b"").is_ok());
    }

    #[test]
    fn test_encode_response() {
        let response = Response {
            code: ResponseCode::Registered,
            payload: vec![1, 2, 3, 4],
        };
        let bytes = encode(&response);

        assert_eq!(bytes.len(), RESPONSE_HEADER_LEN + 4);
        assert_eq!(bytes[0], PROTOCOL_VERSION);
        assert_eq!(u16::from_le_bytes([bytes[1], bytes[2]]), 2100);
        assert_eq!(u32::from_le_bytes([bytes[3], bytes[4], bytes[5], bytes[6]]), 4);
        assert_eq!(&bytes[7..], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_error_response_is_header_only() {
        let bytes = encode(&Response::error());
        assert_eq!(bytes.len(), RESPONSE_HEADER_LEN);
        assert_eq!(u16::from_le_bytes([bytes[1], bytes[2]]), 9000);
    }

    #[test]
    fn test_name_field_round_trip() {
        let field = encode_name("bob");
        assert_eq!(field.len(), NAME_LEN);
        assert_eq!(decode_name(&field).unwrap(), "bob");
    }
}
