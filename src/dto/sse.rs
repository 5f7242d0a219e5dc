use serde::Serialize;
use utoipa::ToSchema;

/// Dispatched payload carried across SSE channels.
#[derive(Clone, Debug)]
pub struct ServerEvent {
    /// SSE event name.
    pub event: Option<String>,
    /// Serialized JSON payload.
    pub data: String,
}

impl ServerEvent {
    /// Create an empty instance.
    pub fn new(event: Option<String>, data: String) -> Self {
        Self { event, data }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

/// First event sent to an SSE client when it subscribes to a project topic.
#[derive(Debug, Serialize, ToSchema)]
pub struct Handshake {
    /// Topic the stream is bound to (`planningPoker:{projectId}`).
    pub topic: String,
    /// Identifier of this stream; pass it to `join`/`leave` to mark presence.
    pub connection_id: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}
