use serde::Serialize;

#[derive(Clone, Debug)]
/// Dispatched payload carried on a room's SSE stream.
pub struct ServerEvent {
    /// Optional SSE event name.
    pub event: Option<String>,
    /// Serialized data field.
    pub data: String,
}

impl ServerEvent {
    /// Build an event carrying a plain-text payload.
    pub fn new(event: impl Into<Option<String>>, data: String) -> Self {
        Self {
            event: event.into(),
            data,
        }
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
