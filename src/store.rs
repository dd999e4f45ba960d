// Durable client registry and per-recipient mailboxes backed by SQLite

use crate::protocol::ClientId;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Storage failures surfaced to the dispatcher
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("name is already registered")]
    NameTaken,
    #[error("client is not registered")]
    UnknownClient,
    #[error("corrupt row: {0}")]
    Corrupt(&'static str),
    #[error("storage backend error: {0}")]
    Backend(#[from] rusqlite::Error),
}

/// A registered client
#[derive(Debug, Clone)]
pub struct ClientRecord {
    pub id: ClientId,
    pub name: String,
    pub public_key: Vec<u8>,
    pub last_seen: i64,
}

/// A message pulled out of a mailbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: u32,
    pub sender: ClientId,
    pub msg_type: u8,
    pub content: Vec<u8>,
}

/// Client and mailbox storage.
///
/// All access is serialized through one guarded connection so that an
/// enqueue and a drain for the same recipient can never interleave.
pub struct MessageStore {
    conn: Mutex<Connection>,
}

impl MessageStore {
    /// Open (or create) the store at the given path
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a transient in-memory store
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create tables and indices
    fn initialize(conn: &Connection) -> Result<(), StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS clients (
                id         BLOB PRIMARY KEY,
                name       TEXT UNIQUE NOT NULL,
                public_key BLOB NOT NULL,
                last_seen  INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                to_client   BLOB NOT NULL,
                from_client BLOB NOT NULL,
                type        INTEGER NOT NULL,
                content     BLOB NOT NULL,
                created_at  INTEGER NOT NULL,
                FOREIGN KEY (to_client) REFERENCES clients(id),
                FOREIGN KEY (from_client) REFERENCES clients(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_to_client ON messages(to_client)",
            [],
        )?;

        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A poisoned lock only means another thread panicked mid-query;
        // the connection itself is still usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a new client under a fresh id.
    ///
    /// Fails with `NameTaken` when the name is already registered, leaving
    /// the table untouched.
    pub fn create_client(&self, name: &str, public_key: &[u8]) -> Result<ClientId, StoreError> {
        let conn = self.lock();

        let taken: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM clients WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        if taken.is_some() {
            return Err(StoreError::NameTaken);
        }

        let id: ClientId = *Uuid::new_v4().as_bytes();
        conn.execute(
            "INSERT INTO clients (id, name, public_key, last_seen) VALUES (?1, ?2, ?3, ?4)",
            params![&id[..], name, public_key, now_unix()],
        )?;

        Ok(id)
    }

    /// Look up a client by id
    pub fn get_client(&self, id: &ClientId) -> Result<ClientRecord, StoreError> {
        let conn = self.lock();

        let row: Option<(Vec<u8>, String, Vec<u8>, i64)> = conn
            .query_row(
                "SELECT id, name, public_key, last_seen FROM clients WHERE id = ?1",
                params![&id[..]],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        match row {
            Some((id, name, public_key, last_seen)) => Ok(ClientRecord {
                id: blob_to_id(id)?,
                name,
                public_key,
                last_seen,
            }),
            None => Err(StoreError::UnknownClient),
        }
    }

    /// Snapshot of every client except the excluded one, in registration order
    pub fn list_clients(&self, excluding: &ClientId) -> Result<Vec<ClientRecord>, StoreError> {
        let conn = self.lock();

        let mut stmt = conn.prepare(
            "SELECT id, name, public_key, last_seen FROM clients
             WHERE id != ?1 ORDER BY rowid",
        )?;

        let rows: Vec<(Vec<u8>, String, Vec<u8>, i64)> = stmt
            .query_map(params![&excluding[..]], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, name, public_key, last_seen)| {
                Ok(ClientRecord {
                    id: blob_to_id(id)?,
                    name,
                    public_key,
                    last_seen,
                })
            })
            .collect()
    }

    /// Update a client's last-seen timestamp. Unknown ids are ignored.
    pub fn touch(&self, id: &ClientId) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "UPDATE clients SET last_seen = ?1 WHERE id = ?2",
            params![now_unix(), &id[..]],
        )?;
        Ok(())
    }

    /// Append a message to the recipient's mailbox.
    ///
    /// The existence check, the insert, and the sender's last-seen update
    /// run in one transaction; a failure leaves no partial row.
    pub fn enqueue_message(
        &self,
        recipient: &ClientId,
        sender: &ClientId,
        msg_type: u8,
        content: &[u8],
    ) -> Result<u32, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM clients WHERE id = ?1",
                params![&recipient[..]],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::UnknownClient);
        }

        tx.execute(
            "INSERT INTO messages (to_client, from_client, type, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![&recipient[..], &sender[..], msg_type, content, now_unix()],
        )?;
        let message_id = tx.last_insert_rowid() as u32;

        tx.execute(
            "UPDATE clients SET last_seen = ?1 WHERE id = ?2",
            params![now_unix(), &sender[..]],
        )?;

        tx.commit()?;
        Ok(message_id)
    }

    /// Atomically retrieve and remove every message addressed to the
    /// recipient, in creation order.
    ///
    /// The select and the delete share one transaction, so the returned set
    /// is exactly the removed set.
    pub fn drain_messages(&self, recipient: &ClientId) -> Result<Vec<StoredMessage>, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let rows: Vec<(i64, Vec<u8>, u8, Vec<u8>)> = {
            let mut stmt = tx.prepare(
                "SELECT id, from_client, type, content FROM messages
                 WHERE to_client = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(params![&recipient[..]], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        tx.execute(
            "DELETE FROM messages WHERE to_client = ?1",
            params![&recipient[..]],
        )?;

        tx.execute(
            "UPDATE clients SET last_seen = ?1 WHERE id = ?2",
            params![now_unix(), &recipient[..]],
        )?;

        tx.commit()?;

        rows.into_iter()
            .map(|(id, sender, msg_type, content)| {
                Ok(StoredMessage {
                    id: id as u32,
                    sender: blob_to_id(sender)?,
                    msg_type,
                    content,
                })
            })
            .collect()
    }

    /// Number of registered clients
    pub fn client_count(&self) -> Result<u64, StoreError> {
        let conn = self.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM clients", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn blob_to_id(blob: Vec<u8>) -> Result<ClientId, StoreError> {
    blob.try_into()
        .map_err(|_| StoreError::Corrupt("client id must be 16 bytes"))
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
