//! Live-update wire protocol.
//!
//! Every frame is a JSON text message of the form
//! `{"type": <tag>, "payload": <any>}`. Server frames are a closed set of
//! variants so dispatch on either side is checked exhaustively; client frames
//! are parsed loosely because the only one the server acts on is `ping`.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::alert::Alert;
use crate::error::{CoreError, Result};
use crate::types::{Deployment, InfraService, Metric, Pipeline, Web3Network};

/// Data stream identifier. Control frames (`ping`/`pong`) have no tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventTag {
    InfrastructureServices,
    Metrics,
    Deployments,
    Pipeline,
    Web3Networks,
    Alerts,
}

impl EventTag {
    pub const ALL: [EventTag; 6] = [
        Self::InfrastructureServices,
        Self::Metrics,
        Self::Deployments,
        Self::Pipeline,
        Self::Web3Networks,
        Self::Alerts,
    ];

    /// Order in which a new connection receives its initial snapshots.
    pub const HANDSHAKE_ORDER: [EventTag; 5] = [
        Self::InfrastructureServices,
        Self::Metrics,
        Self::Deployments,
        Self::Pipeline,
        Self::Web3Networks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InfrastructureServices => "infrastructure-services",
            Self::Metrics => "metrics",
            Self::Deployments => "deployments",
            Self::Pipeline => "pipeline",
            Self::Web3Networks => "web3-networks",
            Self::Alerts => "alerts",
        }
    }
}

impl std::fmt::Display for EventTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventTag {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::UnknownTag(s.to_string()))
    }
}

/// Server-to-client frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    #[serde(rename = "infrastructure-services")]
    InfrastructureServices(Vec<InfraService>),
    #[serde(rename = "metrics")]
    Metrics(Vec<Metric>),
    #[serde(rename = "deployments")]
    Deployments(Vec<Deployment>),
    /// Latest pipeline, `null` when the repository has no runs yet.
    #[serde(rename = "pipeline")]
    Pipeline(Option<Pipeline>),
    #[serde(rename = "web3-networks")]
    Web3Networks(Vec<Web3Network>),
    #[serde(rename = "alerts")]
    Alert(Alert),
    /// Heartbeat reply.
    #[serde(rename = "pong")]
    Pong,
}

impl ServerMessage {
    /// Data tag of this frame, `None` for control frames.
    pub fn tag(&self) -> Option<EventTag> {
        match self {
            Self::InfrastructureServices(_) => Some(EventTag::InfrastructureServices),
            Self::Metrics(_) => Some(EventTag::Metrics),
            Self::Deployments(_) => Some(EventTag::Deployments),
            Self::Pipeline(_) => Some(EventTag::Pipeline),
            Self::Web3Networks(_) => Some(EventTag::Web3Networks),
            Self::Alert(_) => Some(EventTag::Alerts),
            Self::Pong => None,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Generic `{type, payload}` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

/// Client-to-server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Heartbeat request; answered with exactly one `pong`.
    Ping,
    /// Any other well-formed frame. The server does not act on these.
    Other(Envelope),
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(text)?;
        Ok(match envelope.kind.as_str() {
            "ping" => Self::Ping,
            _ => Self::Other(envelope),
        })
    }

    pub fn to_json(&self) -> Result<String> {
        let json = match self {
            Self::Ping => serde_json::to_string(&Envelope::new("ping", serde_json::Value::Null))?,
            Self::Other(envelope) => serde_json::to_string(envelope)?,
        };
        Ok(json)
    }
}
