//! Privileged gateway process for the Orgdesk desktop CRM client.
//!
//! Untrusted presentation surfaces talk to this process over a narrow,
//! allow-listed control channel. The crate owns everything the surfaces must
//! not: remote org credentials and sessions, the diagnostic log store, user
//! preferences, and the find-in-page coordinator.

pub mod channel;
pub mod client;
pub mod find;
pub mod gateway;
pub mod log_store;
pub mod prefs;
pub mod session;

pub use channel::{Direction, InboundKind, OutboundKind, is_permitted};
pub use client::{ClientError, HttpOrgClient, LoginSuccess, OrgClient};
pub use find::{FindDirective, SearchCoordinator, SearchDirection};
pub use gateway::{ControlGateway, FindCommand, InboundMessage, OutboundMessage};
pub use log_store::{LogChannel, LogEntry, LogPage, LogStore};
pub use prefs::Preferences;
pub use session::{OrgSession, SessionRegistry};
