//! Session-scoped symbolic references for remote entities.
//!
//! Slack ids are long and opaque; a ref like `@c3` is something an agent can
//! retype in a follow-up command. Refs live for the lifetime of one manager
//! instance and resolve to the snapshot captured when they were assigned,
//! never a re-fetch. State is instance-owned, so independent scopes can
//! coexist (one per logical session). Cross-invocation replay is the host's
//! job via `serialize`.

use crate::api::{Channel, File, Message, User};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Entity kind a ref points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Channel,
    Message,
    User,
    File,
}

impl RefKind {
    /// One-letter code used in the ref string.
    pub fn letter(self) -> char {
        match self {
            RefKind::Channel => 'c',
            RefKind::Message => 'm',
            RefKind::User => 'u',
            RefKind::File => 'f',
        }
    }
}

/// A resolved ref: entity kind plus the canonical remote identifier
/// (channel id, message timestamp, user id, file id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRef {
    pub kind: RefKind,
    pub id: String,
}

/// Assigns and resolves short-lived refs. Four independent counters and four
/// ref->snapshot maps, one pair per entity type; counters start at 1 and are
/// never reused within one instance.
#[derive(Debug)]
pub struct RefManager {
    channels: HashMap<String, Channel>,
    messages: HashMap<String, Message>,
    users: HashMap<String, User>,
    files: HashMap<String, File>,
    next_channel: u64,
    next_message: u64,
    next_user: u64,
    next_file: u64,
}

impl Default for RefManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RefManager {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
            messages: HashMap::new(),
            users: HashMap::new(),
            files: HashMap::new(),
            next_channel: 1,
            next_message: 1,
            next_user: 1,
            next_file: 1,
        }
    }

    pub fn assign_channel_ref(&mut self, channel: &Channel) -> String {
        let r = format!("@{}{}", RefKind::Channel.letter(), self.next_channel);
        self.next_channel += 1;
        self.channels.insert(r.clone(), channel.clone());
        r
    }

    pub fn assign_message_ref(&mut self, message: &Message) -> String {
        let r = format!("@{}{}", RefKind::Message.letter(), self.next_message);
        self.next_message += 1;
        self.messages.insert(r.clone(), message.clone());
        r
    }

    pub fn assign_user_ref(&mut self, user: &User) -> String {
        let r = format!("@{}{}", RefKind::User.letter(), self.next_user);
        self.next_user += 1;
        self.users.insert(r.clone(), user.clone());
        r
    }

    pub fn assign_file_ref(&mut self, file: &File) -> String {
        let r = format!("@{}{}", RefKind::File.letter(), self.next_file);
        self.next_file += 1;
        self.files.insert(r.clone(), file.clone());
        r
    }

    /// Kind and canonical id for a ref, or None when the two-character prefix
    /// is unrecognized or the ref was never assigned (including after
    /// `clear`).
    pub fn resolve_ref(&self, r: &str) -> Option<ResolvedRef> {
        let mut chars = r.chars();
        if chars.next() != Some('@') {
            return None;
        }
        match chars.next() {
            Some('c') => self.channels.get(r).map(|c| ResolvedRef {
                kind: RefKind::Channel,
                id: c.id.clone(),
            }),
            Some('m') => self.messages.get(r).map(|m| ResolvedRef {
                kind: RefKind::Message,
                id: m.ts.clone(),
            }),
            Some('u') => self.users.get(r).map(|u| ResolvedRef {
                kind: RefKind::User,
                id: u.id.clone(),
            }),
            Some('f') => self.files.get(r).map(|f| ResolvedRef {
                kind: RefKind::File,
                id: f.id.clone(),
            }),
            _ => None,
        }
    }

    /// Empty all four maps and reset all four counters to 1 in one step.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// One flat JSON object mapping every live ref to its canonical id,
    /// for the host to persist and replay in a later invocation.
    pub fn serialize(&self) -> String {
        let mut map = Map::new();
        for (r, c) in &self.channels {
            map.insert(r.clone(), Value::String(c.id.clone()));
        }
        for (r, m) in &self.messages {
            map.insert(r.clone(), Value::String(m.ts.clone()));
        }
        for (r, u) in &self.users {
            map.insert(r.clone(), Value::String(u.id.clone()));
        }
        for (r, f) in &self.files {
            map.insert(r.clone(), Value::String(f.id.clone()));
        }
        Value::Object(map).to_string()
    }

    /// Number of live refs across all entity types.
    pub fn len(&self) -> usize {
        self.channels.len() + self.messages.len() + self.users.len() + self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
