// Request dispatch: maps each decoded request to one store interaction

use crate::protocol::{ClientId, Request, RequestBody};
use crate::store::{MessageStore, StoreError, StoredMessage};

/// The result of handling a request, consumed by the response builder
#[derive(Debug, Clone)]
pub enum Outcome {
    Registered {
        id: ClientId,
    },
    Clients {
        clients: Vec<(ClientId, String)>,
    },
    PublicKey {
        id: ClientId,
        public_key: Vec<u8>,
    },
    MessageQueued {
        recipient: ClientId,
        message_id: u32,
    },
    Pending {
        messages: Vec<StoredMessage>,
    },
}

/// Handle one request against the store.
///
/// Stateless between invocations: everything the handler needs arrives in
/// the request, everything it produces leaves in the outcome. On success
/// the caller's last-seen timestamp is refreshed; registration is the
/// exception, since the caller id in its header carries no meaning and the
/// fresh row gets its timestamp at insert.
pub fn dispatch(store: &MessageStore, request: &Request) -> Result<Outcome, StoreError> {
    let caller = request.header.client_id;

    let outcome = match &request.body {
        RequestBody::Register { name, public_key } => {
            let id = store.create_client(name, public_key)?;
            tracing::info!("registered client {} as {}", hex::encode(id), name);
            return Ok(Outcome::Registered { id });
        }
        RequestBody::ClientList => {
            let clients = store
                .list_clients(&caller)?
                .into_iter()
                .map(|record| (record.id, record.name))
                .collect();
            Outcome::Clients { clients }
        }
        RequestBody::PublicKey { target } => {
            let record = store.get_client(target)?;
            Outcome::PublicKey {
                id: record.id,
                public_key: record.public_key,
            }
        }
        RequestBody::SendMessage {
            recipient,
            msg_type,
            content,
        } => {
            // The enqueue transaction also refreshes the sender's timestamp
            let message_id = store.enqueue_message(recipient, &caller, *msg_type, content)?;
            return Ok(Outcome::MessageQueued {
                recipient: *recipient,
                message_id,
            });
        }
        RequestBody::PendingMessages => {
            // The drain transaction also refreshes the caller's timestamp
            let messages = store.drain_messages(&caller)?;
            return Ok(Outcome::Pending { messages });
        }
    };

    store.touch(&caller)?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{RequestCode, RequestHeader, PUBLIC_KEY_LEN};

    const KEY: [u8; PUBLIC_KEY_LEN] = [0x55; PUBLIC_KEY_LEN];

    fn request(caller: ClientId, code: RequestCode, body: RequestBody) -> Request {
        Request {
            header: RequestHeader {
                client_id: caller,
                version: crate::protocol::PROTOCOL_VERSION,
                code,
                payload_size: 0,
            },
            body,
        }
    }

    fn register(store: &MessageStore, name: &str) -> ClientId {
        let outcome = dispatch(
            store,
            &request(
                [0u8; 16],
                RequestCode::Register,
                RequestBody::Register {
                    name: name.to_string(),
                    public_key: KEY,
                },
            ),
        )
        .unwrap();
        match outcome {
            Outcome::Registered { id } => id,
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_register_then_fetch_public_key() {
        let store = MessageStore::open_in_memory().unwrap();
        let alice = register(&store, "alice");
        let bob = register(&store, "bob");

        let outcome = dispatch(
            &store,
            &request(alice, RequestCode::PublicKey, RequestBody::PublicKey { target: bob }),
        )
        .unwrap();

        match outcome {
            Outcome::PublicKey { id, public_key } => {
                assert_eq!(id, bob);
                assert_eq!(public_key, KEY.to_vec());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let store = MessageStore::open_in_memory().unwrap();
        register(&store, "alice");

        let result = dispatch(
            &store,
            &request(
                [0u8; 16],
                RequestCode::Register,
                RequestBody::Register {
                    name: "alice".to_string(),
                    public_key: KEY,
                },
            ),
        );
        assert!(matches!(result, Err(StoreError::NameTaken)));
        assert_eq!(store.client_count().unwrap(), 1);
    }

    #[test]
    fn test_client_list_excludes_caller() {
        let store = MessageStore::open_in_memory().unwrap();
        let alice = register(&store, "alice");
        let bob = register(&store, "bob");

        let outcome = dispatch(
            &store,
            &request(alice, RequestCode::ClientList, RequestBody::ClientList),
        )
        .unwrap();

        match outcome {
            Outcome::Clients { clients } => {
                assert_eq!(clients, vec![(bob, "bob".to_string())]);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_send_to_unknown_recipient_fails() {
        let store = MessageStore::open_in_memory().unwrap();
        let alice = register(&store, "alice");

        let result = dispatch(
            &store,
            &request(
                alice,
                RequestCode::SendMessage,
                RequestBody::SendMessage {
                    recipient: [9u8; 16],
                    msg_type: 3,
                    content: b"hello".to_vec(),
                },
            ),
        );
        assert!(matches!(result, Err(StoreError::UnknownClient)));
    }

    #[test]
    fn test_send_then_drain_round_trip() {
        let store = MessageStore::open_in_memory().unwrap();
        let alice = register(&store, "alice");
        let bob = register(&store, "bob");

        dispatch(
            &store,
            &request(
                alice,
                RequestCode::SendMessage,
                RequestBody::SendMessage {
                    recipient: bob,
                    msg_type: 3,
                    content: b"hi bob".to_vec(),
                },
            ),
        )
        .unwrap();

        let outcome = dispatch(
            &store,
            &request(bob, RequestCode::PendingMessages, RequestBody::PendingMessages),
        )
        .unwrap();

        match outcome {
            Outcome::Pending { messages } => {
                assert_eq!(messages.len(), 1);
                assert_eq!(messages[0].sender, alice);
                assert_eq!(messages[0].msg_type, 3);
                assert_eq!(messages[0].content, b"hi bob");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        // Second drain comes back empty, not as an error
        let outcome = dispatch(
            &store,
            &request(bob, RequestCode::PendingMessages, RequestBody::PendingMessages),
        )
        .unwrap();
        match outcome {
            Outcome::Pending { messages } => assert!(messages.is_empty()),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
