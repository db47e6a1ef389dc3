//! Wire types for the build API and the completion callback.
//!
//! Everything here is plain data. A `BuildRequest` arrives on `/api/build`,
//! a `NotificationPayload` leaves for the caller's evaluation URL, and
//! nothing in between is persisted.

use serde::{Deserialize, Serialize};

// ─── Round ───────────────────────────────────────────────────────────────────

/// Processing mode for a task.
///
/// On the wire this is the integer `1` or `2`; any other value is rejected
/// while the request body is being decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Round {
    /// Round 1: generate the app from scratch and create the repository.
    Build,
    /// Round 2: revise the app already published by round 1.
    Revise,
}

impl Round {
    pub fn number(self) -> u8 {
        match self {
            Round::Build => 1,
            Round::Revise => 2,
        }
    }
}

impl TryFrom<u8> for Round {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Round::Build),
            2 => Ok(Round::Revise),
            other => Err(format!("unsupported round {other}, expected 1 or 2")),
        }
    }
}

impl From<Round> for u8 {
    fn from(round: Round) -> u8 {
        round.number()
    }
}

impl std::fmt::Display for Round {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Round::Build => write!(f, "build"),
            Round::Revise => write!(f, "revise"),
        }
    }
}

// ─── Build request ───────────────────────────────────────────────────────────

/// A file handed to the generator as reference material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    /// Usually a `data:` URI carrying the file inline.
    pub url: String,
}

/// Body of `POST /api/build`.
#[derive(Clone, Serialize, Deserialize)]
pub struct BuildRequest {
    /// Shared secret checked by the intake. Redacted from `Debug` output.
    #[serde(default)]
    pub secret: String,
    /// Stable task id; doubles as the repository name.
    pub task: String,
    pub round: Round,
    pub brief: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub checks: Vec<String>,
    pub email: String,
    pub nonce: String,
    pub evaluation_url: String,
}

impl std::fmt::Debug for BuildRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildRequest")
            .field("secret", &"<redacted>")
            .field("task", &self.task)
            .field("round", &self.round)
            .field("brief", &self.brief)
            .field("attachments", &self.attachments)
            .field("checks", &self.checks)
            .field("email", &self.email)
            .field("nonce", &self.nonce)
            .field("evaluation_url", &self.evaluation_url)
            .finish()
    }
}

// ─── Notification ────────────────────────────────────────────────────────────

/// JSON posted to `evaluation_url` once a round finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub email: String,
    pub task: String,
    pub round: u8,
    pub nonce: String,
    pub repo_url: String,
    pub commit_sha: String,
    pub pages_url: String,
}

/// Synchronous reply of the intake, for both the accepted and rejected case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeReply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
