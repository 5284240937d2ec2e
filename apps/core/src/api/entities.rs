//! Normalized Slack entity snapshots.
//!
//! The Web API omits or nulls fields freely depending on method, entity age
//! and workspace plan. Everything here deserializes with defaults so
//! downstream code never special-cases a missing field: absent strings come
//! back empty, absent counts zero, absent flags false. Only genuinely nested
//! structures (reactions, attached files) stay optional.

use serde::{Deserialize, Deserializer, Serialize};

/// Unwrap Slack's `{"value": "..."}` wrapper used for channel topic and
/// purpose. Absent or null wrappers collapse to an empty string.
fn wrapped_value<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper {
        #[serde(default)]
        value: String,
    }
    Ok(Option::<Wrapper>::deserialize(de)?
        .map(|w| w.value)
        .unwrap_or_default())
}

/// Accept a channel given either as a bare id ("C123") or as the
/// `{"id": ..., "name": ...}` object search results carry.
fn channel_id<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Id(String),
        Obj {
            #[serde(default)]
            id: String,
        },
    }
    Ok(match Option::<Raw>::deserialize(de)? {
        None => String::new(),
        Some(Raw::Id(s)) => s,
        Some(Raw::Obj { id }) => id,
    })
}

/// Result of `auth.test`: who the token authenticates as.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthInfo {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub team: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub user_id: String,
}

/// A conversation: public/private channel, DM or group DM.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Channel {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub is_im: bool,
    #[serde(default)]
    pub is_member: bool,
    #[serde(default)]
    pub num_members: u64,
    #[serde(default, deserialize_with = "wrapped_value")]
    pub topic: String,
    #[serde(default, deserialize_with = "wrapped_value")]
    pub purpose: String,
    #[serde(default)]
    pub created: i64,
}

/// One message. The canonical identifier is the timestamp string.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Message {
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, deserialize_with = "channel_id")]
    pub channel: String,
    #[serde(default)]
    pub thread_ts: String,
    #[serde(default)]
    pub reply_count: u64,
    #[serde(default)]
    pub permalink: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reactions: Option<Vec<Reaction>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<File>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Reaction {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub users: Vec<String>,
}

/// A workspace member.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct User {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub real_name: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub tz: String,
    #[serde(default)]
    pub profile: UserProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UserProfile {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub title: String,
}

/// An uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct File {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub mimetype: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub url_private: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub created: i64,
}
