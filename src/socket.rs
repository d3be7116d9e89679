//! Event protocol for the WebSocket messaging channel.
//!
//! Every WebSocket text message is one frame, `{"event": <name>, "data": <payload>}`.
//! Clients send `send_message` with a JSON-text payload `{"query": ...}`; the server
//! answers with `receive_response` (the answer serialized to JSON text) and greets
//! each new connection with `status`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::QueryEnvelope;
use crate::query::QueryInterface;

pub const SEND_MESSAGE: &str = "send_message";
pub const RECEIVE_RESPONSE: &str = "receive_response";
pub const STATUS: &str = "status";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn connected() -> Self {
        Self::new(STATUS, json!({ "data": "Connected" }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// One client connection. Holds no resources beyond the shared query interface.
pub struct Session {
    id: Uuid,
    state: ConnectionState,
    queries: QueryInterface,
}

impl Session {
    pub fn new(queries: QueryInterface) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: ConnectionState::Disconnected,
            queries,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn connect(&mut self) -> EventFrame {
        self.state = ConnectionState::Connected;
        tracing::info!(sid = %self.id, "client connected");
        EventFrame::connected()
    }

    pub fn disconnect(&mut self) {
        self.state = ConnectionState::Disconnected;
        tracing::info!(sid = %self.id, "client disconnected");
    }

    /// Handles one incoming frame and returns the frame to send back, if any.
    pub async fn handle_frame(&self, text: &str) -> Option<EventFrame> {
        if self.state != ConnectionState::Connected {
            tracing::warn!(sid = %self.id, "frame received on a closed session");
            return None;
        }

        let frame = match serde_json::from_str::<EventFrame>(text) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(sid = %self.id, error = %err, "dropping malformed frame: {text}");
                return None;
            }
        };

        match frame.event.as_str() {
            SEND_MESSAGE => self.handle_message(&frame.data).await,
            other => {
                tracing::debug!(sid = %self.id, event = other, "ignoring unknown event");
                None
            }
        }
    }

    async fn handle_message(&self, data: &Value) -> Option<EventFrame> {
        // Malformed messages are dropped without telling the client.
        let Some(query) = parse_query(data) else {
            tracing::warn!(sid = %self.id, "error processing message: {data}");
            return None;
        };
        tracing::info!(sid = %self.id, %query, "received query");

        let response = match self.queries.get_answer(&query, false, false).await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(sid = %self.id, "query failed: {err:#}");
                return None;
            }
        };

        match serde_json::to_string(&response) {
            Ok(serialized) => Some(EventFrame::new(RECEIVE_RESPONSE, Value::String(serialized))),
            Err(err) => {
                tracing::error!(sid = %self.id, "failed to serialize response: {err}");
                None
            }
        }
    }
}

/// Extracts the query from a `send_message` payload, which must be JSON text.
pub fn parse_query(data: &Value) -> Option<String> {
    let text = data.as_str()?;
    serde_json::from_str::<QueryEnvelope>(text)
        .ok()
        .map(|envelope| envelope.query)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::Document;
    use crate::query::tests::{interface, FakeFactory, FakeLlm};

    fn session(answer: &str) -> Session {
        let docs = vec![Document::new("chunk").with_metadata("source", "a.txt")];
        Session::new(interface(
            Arc::new(FakeLlm::new(answer)),
            Arc::new(FakeFactory::new(docs)),
        ))
    }

    fn send_message(payload: Value) -> String {
        serde_json::to_string(&EventFrame::new(SEND_MESSAGE, payload)).unwrap()
    }

    #[test]
    fn connect_emits_status_first() {
        let mut session = session("hi");
        assert_eq!(session.state(), ConnectionState::Disconnected);

        let frame = session.connect();
        assert_eq!(frame.event, STATUS);
        assert_eq!(frame.data, json!({ "data": "Connected" }));
        assert_eq!(session.state(), ConnectionState::Connected);

        session.disconnect();
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn parse_query_requires_json_text_with_query() {
        assert_eq!(
            parse_query(&json!(r#"{"query": "hello"}"#)).as_deref(),
            Some("hello")
        );
        assert_eq!(parse_query(&json!("not json")), None);
        assert_eq!(parse_query(&json!(r#"{"question": "hello"}"#)), None);
        assert_eq!(parse_query(&json!(r#"{"query": 7}"#)), None);
        assert_eq!(parse_query(&json!({ "query": "hello" })), None);
        assert_eq!(parse_query(&Value::Null), None);
    }

    #[tokio::test]
    async fn malformed_message_is_dropped() {
        let mut session = session("hi");
        session.connect();

        assert!(session.handle_frame(&send_message(json!("not json"))).await.is_none());
        assert!(session.handle_frame("not a frame").await.is_none());
        assert!(session
            .handle_frame(&send_message(json!(r#"{"q": "x"}"#)))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn valid_message_yields_one_response() {
        let mut session = session("hello back");
        session.connect();

        let frame = session
            .handle_frame(&send_message(json!(r#"{"query": "hello"}"#)))
            .await
            .expect("response frame");

        assert_eq!(frame.event, RECEIVE_RESPONSE);
        let payload: Value = serde_json::from_str(frame.data.as_str().unwrap()).unwrap();
        for key in ["question", "answer", "time_taken", "source_documents"] {
            assert!(payload.get(key).is_some(), "missing {key}");
        }
        assert_eq!(payload["answer"], "hello back");
        assert_eq!(payload["source_documents"][0]["metadata"]["source"], "a.txt");
    }

    #[tokio::test]
    async fn whitespace_query_gets_invalid_sentinel() {
        let mut session = session("unused");
        session.connect();

        let frame = session
            .handle_frame(&send_message(json!(r#"{"query": "  "}"#)))
            .await
            .expect("response frame");
        let payload: Value = serde_json::from_str(frame.data.as_str().unwrap()).unwrap();
        assert_eq!(payload, json!({ "result": "Invalid query", "source_documents": [] }));
    }

    #[tokio::test]
    async fn failed_query_sends_nothing() {
        let mut session = session("fail");
        session.connect();

        let frame = session
            .handle_frame(&send_message(json!(r#"{"query": "hello"}"#)))
            .await;
        assert!(frame.is_none());
        assert_eq!(session.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn unknown_events_and_closed_sessions_are_ignored() {
        let mut session = session("hi");
        let frame = send_message(json!(r#"{"query": "hello"}"#));
        assert!(session.handle_frame(&frame).await.is_none());

        session.connect();
        let other = serde_json::to_string(&EventFrame::new("ping", Value::Null)).unwrap();
        assert!(session.handle_frame(&other).await.is_none());
    }
}
