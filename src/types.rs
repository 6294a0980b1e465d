use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::config::DEFAULT_PORT;

/// Player identifier (`pid`)
pub type PlayerId = i64;

/// Group identifier (`gid`)
pub type GroupId = i64;

/// Music source identifier (`sid`)
pub type SourceId = i64;

/// Resolved network address of a HEOS device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceAddress {
    pub host: String,
    pub port: u16,
}

impl DeviceAddress {
    /// Address on the default command port
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Player information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,

    #[serde(deserialize_with = "number_or_string")]
    pub pid: PlayerId,

    /// Group the player belongs to, if grouped
    #[serde(default, deserialize_with = "optional_number_or_string")]
    pub gid: Option<GroupId>,

    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub version: String,

    /// "wired", "wifi" or "unknown"
    #[serde(default)]
    pub network: String,

    #[serde(default)]
    pub lineout: Option<u8>,

    #[serde(default)]
    pub serial: Option<String>,
}

/// Player group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,

    #[serde(deserialize_with = "number_or_string")]
    pub gid: GroupId,

    #[serde(default)]
    pub players: Vec<GroupMember>,
}

impl Group {
    /// The member with the `leader` role
    pub fn leader(&self) -> Option<&GroupMember> {
        self.players.iter().find(|p| p.role == "leader")
    }
}

/// Member of a player group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub name: String,

    #[serde(deserialize_with = "number_or_string")]
    pub pid: PlayerId,

    /// "leader" or "member"
    #[serde(default)]
    pub role: String,
}

/// Music source (service, input or local library)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicSource {
    pub name: String,

    #[serde(deserialize_with = "number_or_string")]
    pub sid: SourceId,

    #[serde(rename = "type", default)]
    pub source_type: String,

    #[serde(default)]
    pub image_url: String,

    /// The device reports this as the string "true" or "false"
    #[serde(default)]
    pub available: Option<String>,
}

impl MusicSource {
    pub fn is_available(&self) -> bool {
        self.available.as_deref() != Some("false")
    }
}

/// Entry in a player's queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    #[serde(default)]
    pub song: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub image_url: String,

    /// Position in the queue, starting at 1
    #[serde(deserialize_with = "number_or_string")]
    pub qid: i64,

    #[serde(default)]
    pub mid: String,
    #[serde(default)]
    pub album_id: String,
}

/// Media currently playing on a player
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NowPlayingMedia {
    #[serde(rename = "type", default)]
    pub media_type: String,
    #[serde(default)]
    pub song: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub station: Option<String>,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub album_id: String,
    #[serde(default)]
    pub mid: String,
    #[serde(default, deserialize_with = "optional_number_or_string")]
    pub qid: Option<i64>,
    #[serde(default, deserialize_with = "optional_number_or_string")]
    pub sid: Option<SourceId>,
}

// The device is inconsistent about quoting numeric ids, so accept both forms.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(i64),
    String(String),
}

impl NumberOrString {
    fn into_i64<E: serde::de::Error>(self) -> std::result::Result<i64, E> {
        match self {
            NumberOrString::Number(n) => Ok(n),
            NumberOrString::String(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("expected numeric id, got {:?}", s))),
        }
    }
}

fn number_or_string<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    NumberOrString::deserialize(deserializer)?.into_i64()
}

fn optional_number_or_string<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrString>::deserialize(deserializer)? {
        Some(NumberOrString::String(s)) if s.is_empty() => Ok(None),
        Some(value) => value.into_i64().map(Some),
        None => Ok(None),
    }
}
