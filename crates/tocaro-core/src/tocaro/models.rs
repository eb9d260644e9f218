//! Data models for the Tocaro API.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// A Tocaro group or talk as returned by the groups listing.
///
/// The server object is kept as received, in server order, so `groups.json`
/// mirrors the payload. `code` and `type` are checked while deserializing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct Group {
    fields: Map<String, Value>,
}

impl Group {
    /// Unique group code, used as the group id in message URLs.
    #[must_use]
    pub fn code(&self) -> &str {
        str_field(&self.fields, "code")
    }

    /// Display name; empty when the server sends none or `null`.
    #[must_use]
    pub fn name(&self) -> &str {
        str_field(&self.fields, "name")
    }

    /// Group kind.
    #[must_use]
    pub fn kind(&self) -> GroupKind {
        GroupKind::from(str_field(&self.fields, "type").to_string())
    }

    /// All server fields, in server order.
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl TryFrom<Map<String, Value>> for Group {
    type Error = String;

    fn try_from(fields: Map<String, Value>) -> Result<Self, Self::Error> {
        require_str(&fields, "group", "code")?;
        require_str(&fields, "group", "type")?;
        Ok(Self { fields })
    }
}

impl Serialize for Group {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

/// Kind of a group entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupKind {
    /// Multi-member group.
    Group,
    /// Direct talk.
    Talk,
    /// Any other kind the server reports.
    Other(String),
}

impl GroupKind {
    /// Whether messages of this kind are exported.
    #[must_use]
    pub const fn is_exportable(&self) -> bool {
        matches!(self, Self::Group | Self::Talk)
    }

    /// Wire name of the kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Group => "group",
            Self::Talk => "talk",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for GroupKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "group" => Self::Group,
            "talk" => Self::Talk,
            _ => Self::Other(s),
        }
    }
}

impl From<GroupKind> for String {
    fn from(kind: GroupKind) -> Self {
        match kind {
            GroupKind::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for GroupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visibility filter for the groups listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum GroupType {
    /// Groups shown in the sidebar (default).
    #[default]
    Show,
    /// Hidden groups.
    Hide,
}

impl GroupType {
    /// Query-string value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Show => "show",
            Self::Hide => "hide",
        }
    }
}

impl std::fmt::Display for GroupType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message, kept as the server sent it.
///
/// The `ulid` doubles as the pagination cursor and is checked while
/// deserializing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct Message {
    fields: Map<String, Value>,
}

impl Message {
    /// Build a message with no fields besides its ulid.
    #[must_use]
    pub fn new(ulid: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("ulid".to_string(), Value::String(ulid.into()));
        Self { fields }
    }

    /// Monotonic message id, unique within a group.
    #[must_use]
    pub fn ulid(&self) -> &str {
        str_field(&self.fields, "ulid")
    }

    /// All server fields, in server order.
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Mutable access to the server fields.
    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.fields
    }
}

impl TryFrom<Map<String, Value>> for Message {
    type Error = String;

    fn try_from(fields: Map<String, Value>) -> Result<Self, Self::Error> {
        require_str(&fields, "message", "ulid")?;
        Ok(Self { fields })
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

fn str_field<'a>(fields: &'a Map<String, Value>, key: &str) -> &'a str {
    fields.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn require_str(fields: &Map<String, Value>, what: &str, key: &str) -> Result<(), String> {
    match fields.get(key) {
        Some(Value::String(_)) => Ok(()),
        Some(other) => Err(format!("{what} field `{key}` must be a string, got {other}")),
        None => Err(format!("{what} is missing `{key}`")),
    }
}
