// Response builder: turns a handler outcome into a wire-ready response

use crate::dispatch::Outcome;
use crate::protocol::{encode_name, Response, ResponseCode};
use crate::store::StoreError;

/// Build the response for a dispatch result.
///
/// Total: every outcome, success or failure, maps to a well-formed
/// response. All error kinds collapse to the single error code with an
/// empty payload.
pub fn build(result: Result<Outcome, StoreError>) -> Response {
    match result {
        Ok(outcome) => build_success(outcome),
        Err(_) => Response::error(),
    }
}

fn build_success(outcome: Outcome) -> Response {
    match outcome {
        Outcome::Registered { id } => Response {
            code: ResponseCode::Registered,
            payload: id.to_vec(),
        },
        Outcome::Clients { clients } => {
            let mut payload = Vec::new();
            for (id, name) in &clients {
                payload.extend_from_slice(id);
                payload.extend_from_slice(&encode_name(name));
            }
            Response {
                code: ResponseCode::ClientList,
                payload,
            }
        }
        Outcome::PublicKey { id, public_key } => {
            let mut payload = id.to_vec();
            payload.extend_from_slice(&public_key);
            Response {
                code: ResponseCode::PublicKey,
                payload,
            }
        }
        Outcome::MessageQueued {
            recipient,
            message_id,
        } => {
            let mut payload = recipient.to_vec();
            payload.extend_from_slice(&message_id.to_le_bytes());
            Response {
                code: ResponseCode::MessageQueued,
                payload,
            }
        }
        Outcome::Pending { messages } => {
            let mut payload = Vec::new();
            for message in &messages {
                payload.extend_from_slice(&message.sender);
                payload.extend_from_slice(&message.id.to_le_bytes());
                payload.push(message.msg_type);
                payload.extend_from_slice(&(message.content.len() as u32).to_le_bytes());
                payload.extend_from_slice(&message.content);
            }
            Response {
                code: ResponseCode::PendingMessages,
                payload,
            }
        }
    }
}
