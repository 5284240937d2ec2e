//! slacktap Core Library
//!
//! Core library for slacktap - command-line Slack access without an OAuth
//! flow. Provides the following capabilities:
//! - Recover workspace tokens and the session cookie from the Slack desktop
//!   client's local storage (LevelDB stores + Chromium cookie database)
//! - Drive the Slack Web API through a retrying, paginating blocking client
//! - Hand out short symbolic refs (@c1, @m2, ...) for channels, messages,
//!   users and files, resolvable back to canonical ids
//!
//! Pipeline: extract (desktop storage) -> store (credentials file) ->
//! call (API client) -> ref (symbolic handles for the driving agent)

pub mod api;
pub mod credentials;
pub mod error;
pub mod extractor;
pub mod refs;

// Re-export main types
pub use api::{AuthInfo, Channel, File, HistoryOptions, Message, SlackClient, User};
pub use credentials::{CredentialStore, CredentialsFile, WorkspaceCredentials};
pub use error::{Error, Result};
pub use extractor::{Extraction, StoreOutcome, TokenExtractor};
pub use refs::{RefKind, RefManager, ResolvedRef};
