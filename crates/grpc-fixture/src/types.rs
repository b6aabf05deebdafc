//! Recorded interactions as they appear in fixture dumps.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use grpc_proxy::grpc::status::status_from_code;
use std::fmt;
use tonic::{Code, Status};

/// Which side of the call sent a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageOrigin {
    Client,
    Server,
}

/// One message of a recorded call. The payload is kept as opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedMessage {
    pub message_origin: MessageOrigin,
    #[serde(with = "base64_payload")]
    pub raw_message: Bytes,
}

impl RecordedMessage {
    pub fn client(payload: impl Into<Bytes>) -> Self {
        Self {
            message_origin: MessageOrigin::Client,
            raw_message: payload.into(),
        }
    }

    pub fn server(payload: impl Into<Bytes>) -> Self {
        Self {
            message_origin: MessageOrigin::Server,
            raw_message: payload.into(),
        }
    }
}

/// Final status of a recorded call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedStatus {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

impl RecordedStatus {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code: code as i32,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == 0
    }

    /// The recorded status, with its exact code even when `Code` has no
    /// variant for it.
    pub fn to_status(&self) -> Status {
        status_from_code(self.code, self.message.clone())
    }
}

/// A complete recorded call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedRpc {
    pub service: String,
    pub method: String,
    #[serde(default)]
    pub messages: Vec<RecordedMessage>,
    /// Absent or null for calls that completed with OK
    #[serde(default, alias = "status", skip_serializing_if = "Option::is_none")]
    pub error: Option<RecordedStatus>,
}

impl RecordedRpc {
    pub fn key(&self) -> MethodKey {
        MethodKey::new(&self.service, &self.method)
    }

    pub fn status(&self) -> RecordedStatus {
        self.error.clone().unwrap_or_default()
    }

    fn payloads(&self, origin: MessageOrigin) -> impl Iterator<Item = &Bytes> {
        self.messages
            .iter()
            .filter(move |m| m.message_origin == origin)
            .map(|m| &m.raw_message)
    }

    /// The first message the client sent.
    pub fn request(&self) -> Option<&Bytes> {
        self.payloads(MessageOrigin::Client).next()
    }

    /// The first message the server sent.
    pub fn response(&self) -> Option<&Bytes> {
        self.payloads(MessageOrigin::Server).next()
    }

    /// One request, and either one response or a failure with no response.
    pub fn is_unary(&self) -> bool {
        let requests = self.payloads(MessageOrigin::Client).count();
        let responses = self.payloads(MessageOrigin::Server).count();
        requests == 1 && (responses == 1 || (responses == 0 && !self.status().is_ok()))
    }
}

/// `<service>/<method>`, the index key for recorded calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodKey(String);

impl MethodKey {
    pub fn new(service: &str, method: &str) -> Self {
        Self(format!("{service}/{method}"))
    }

    /// Parse a full method path, `/<service>/<method>`.
    pub fn from_full_method(full_method: &str) -> Option<Self> {
        let mut parts = full_method.split('/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(""), Some(service), Some(method), None)
                if !service.is_empty() && !method.is_empty() =>
            {
                Some(Self::new(service, method))
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

mod base64_payload {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(payload: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(payload))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(|e| serde::de::Error::custom(format!("invalid base64 message: {e}")))
    }
}
