//! Core protocol types for Lodestar's wire format.
//!
//! Every frame exchanged with a client is a flat JSON object:
//!
//! ```json
//! { "type": "move", "id": "p1", "x": 1.5, "z": -3.0, "ry": 0.25, "action": "", "text": "" }
//! ```
//!
//! [`PlayerState`] is that object. It is also the unit the hub caches in
//! the hot tier, so the same type flows from the socket into the store
//! and back out to peers.
//!
//! Routing does not work on the flat frame directly. [`Inbound::classify`]
//! turns a frame into a sum type whose variants only carry the fields
//! that kind of message actually uses.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A stable player identifier chosen by the client.
///
/// An empty identifier means "anonymous": such frames are still
/// broadcast, but they never touch the state store.
///
/// `#[serde(transparent)]` keeps the wire form a plain JSON string.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    /// Creates a player ID from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the anonymous (empty) identifier.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for PlayerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// MessageKind
// ---------------------------------------------------------------------------

/// The `type` tag of a frame.
///
/// Clients may send tags the hub does not know about (`"emote"`, `"use"`,
/// ...). Those are kept verbatim in [`MessageKind::Other`] so they are
/// rebroadcast exactly as received.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    Join,
    Chat,
    Move,
    Leave,
    Other(String),
}

impl MessageKind {
    /// Returns the wire spelling of this tag.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Join => "join",
            Self::Chat => "chat",
            Self::Move => "move",
            Self::Leave => "leave",
            Self::Other(tag) => tag,
        }
    }
}

impl Default for MessageKind {
    /// A frame without a `type` field carries the empty tag.
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl From<String> for MessageKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "join" => Self::Join,
            "chat" => Self::Chat,
            "move" => Self::Move,
            "leave" => Self::Leave,
            _ => Self::Other(tag),
        }
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Other(tag) => tag,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Pose
// ---------------------------------------------------------------------------

/// Planar position and yaw: the part of a player's state that survives a
/// disconnect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f32,
    pub z: f32,
    pub ry: f32,
}

impl Pose {
    pub fn new(x: f32, z: f32, ry: f32) -> Self {
        Self { x, z, ry }
    }
}

// ---------------------------------------------------------------------------
// PlayerState: the wire frame
// ---------------------------------------------------------------------------

/// One frame on the wire, and the unit cached per player in the hot tier.
///
/// Every field defaults when missing, so `{"type":"chat","text":"hi"}` is
/// a valid frame. All seven fields are always written back out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerState {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub id: PlayerId,
    pub x: f32,
    pub z: f32,
    pub ry: f32,
    /// Free-form interaction tag. Never persisted to the cold tier.
    pub action: String,
    /// Chat payload. Never persisted to the cold tier.
    pub text: String,
}

impl PlayerState {
    /// Builds a frame of the given kind positioned at `pose`.
    pub fn at(kind: MessageKind, id: PlayerId, pose: Pose) -> Self {
        Self {
            kind,
            id,
            x: pose.x,
            z: pose.z,
            ry: pose.ry,
            ..Self::default()
        }
    }

    /// The `leave` frame synthesized when a bound connection goes away.
    pub fn leave(id: PlayerId) -> Self {
        Self {
            kind: MessageKind::Leave,
            id,
            ..Self::default()
        }
    }

    /// Returns the position-bearing part of this frame.
    pub fn pose(&self) -> Pose {
        Pose::new(self.x, self.z, self.ry)
    }
}

// ---------------------------------------------------------------------------
// Inbound: classified view of a frame
// ---------------------------------------------------------------------------

/// A client frame classified by what the hub must do with it.
///
/// Classification never rejects a frame: anything that decoded as a
/// [`PlayerState`] ends up in exactly one variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// `type == "join"`: bind the connection and replay world state.
    /// The identifier may be empty; the join is still announced.
    Join {
        id: PlayerId,
        pose: Pose,
        action: String,
    },

    /// `type == "chat"`: relay only, never stored.
    Chat { id: PlayerId, text: String },

    /// Any other tag with a non-empty id (`move`, `leave`, custom tags):
    /// refresh the cached state, then relay.
    Update(PlayerState),

    /// Any other tag with an empty id: relay only.
    Passthrough,
}

impl Inbound {
    /// Classifies a decoded frame.
    pub fn classify(frame: &PlayerState) -> Self {
        match frame.kind {
            MessageKind::Join => Self::Join {
                id: frame.id.clone(),
                pose: frame.pose(),
                action: frame.action.clone(),
            },
            MessageKind::Chat => Self::Chat {
                id: frame.id.clone(),
                text: frame.text.clone(),
            },
            _ if frame.id.is_empty() => Self::Passthrough,
            _ => Self::Update(frame.clone()),
        }
    }
}
