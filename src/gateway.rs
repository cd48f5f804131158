//! The control gateway between untrusted presentation surfaces and the
//! privileged process.
//!
//! Each inbound request kind is dispatched independently against the shared
//! Session Registry and Log Store. Replies and events travel back as
//! fire-and-forget outbound messages; a surface that is not listening simply
//! misses the event (the console can always re-query via `get_log_messages`).
//! Nothing on a request path may terminate the process: remote failures and
//! unknown sessions become structured failure replies, disallowed kinds are
//! dropped without a trace.

use crate::channel::{Direction, InboundKind, OutboundKind, is_permitted};
use crate::client::OrgClient;
use crate::find::{FindDirective, SearchCoordinator, SearchDirection};
use crate::log_store::{LogChannel, LogStore};
use crate::prefs::Preferences;
use crate::session::{OrgSession, SessionRegistry};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Surface that observes pushed log events.
pub const CONSOLE_SURFACE: &str = "console";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// One frame arriving from an untrusted surface. The sender identity is NOT
/// part of the frame; the transport derives it from the connection itself.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

/// One event leaving the privileged process. The kind is typed, so only
/// allow-listed kinds can be constructed.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage {
    pub target: String,
    pub kind: OutboundKind,
    pub payload: Value,
}

/// A find directive addressed to one surface, executed by the embedding
/// shell through the page-search API (outside the IPC channel).
#[derive(Debug, Clone, PartialEq)]
pub struct FindCommand {
    pub surface: String,
    pub directive: FindDirective,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub url: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub token: String,
}

impl LoginRequest {
    /// Copy safe to echo back across the trust boundary.
    pub fn redacted(&self) -> Self {
        Self {
            url: self.url.clone(),
            username: self.username.clone(),
            password: String::new(),
            token: String::new(),
        }
    }

    /// The remote protocol expects the security token appended to the
    /// password when one is present.
    fn effective_password(&self) -> String {
        if self.token.is_empty() {
            self.password.clone()
        } else {
            format!("{}{}", self.password, self.token)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogoutRequest {
    pub org: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogQuery {
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_log_count")]
    pub count: usize,
}

fn default_log_count() -> usize {
    50
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendLogRequest {
    pub channel: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FindRequest {
    pub text: String,
    pub direction: SearchDirection,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no active session for org {0}")]
    UnknownSession(String),
    #[error("malformed {kind} request: {reason}")]
    MalformedRequest { kind: InboundKind, reason: String },
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

pub struct ControlGateway {
    registry: Arc<SessionRegistry>,
    log: Arc<LogStore>,
    client: Arc<dyn OrgClient>,
    find: SearchCoordinator,
    prefs: parking_lot::RwLock<Preferences>,
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    find_tx: mpsc::UnboundedSender<FindCommand>,
}

impl ControlGateway {
    pub fn new(
        registry: Arc<SessionRegistry>,
        log: Arc<LogStore>,
        client: Arc<dyn OrgClient>,
        prefs: Preferences,
        outbound: mpsc::UnboundedSender<OutboundMessage>,
        find_tx: mpsc::UnboundedSender<FindCommand>,
    ) -> Self {
        let find = SearchCoordinator::new(log.clone());
        Self {
            registry,
            log,
            client,
            find,
            prefs: parking_lot::RwLock::new(prefs),
            outbound,
            find_tx,
        }
    }

    /// Dispatch one inbound frame from `surface`.
    ///
    /// A kind outside the inbound allow-list is dropped here with no reply
    /// and no log entry — deliberately invisible, so a probing surface gets
    /// no discovery oracle.
    pub async fn handle(&self, surface: &str, message: InboundMessage) {
        let Ok(kind) = message.kind.parse::<InboundKind>() else {
            return;
        };
        match kind {
            InboundKind::GetPreferences => self.handle_get_preferences(surface),
            InboundKind::GetLogMessages => self.handle_get_log_messages(surface, message.payload),
            InboundKind::SfLogin => self.handle_login(surface, message.payload).await,
            InboundKind::SfLogout => self.handle_logout(surface, message.payload).await,
            InboundKind::SendLog => self.handle_send_log(surface, message.payload),
            InboundKind::FindText => self.handle_find(surface, message.payload),
        }
    }

    fn handle_get_preferences(&self, surface: &str) {
        let theme = self.prefs.read().theme.clone();
        self.send(
            surface,
            OutboundKind::CurrentPreferences,
            json!({ "theme": theme }),
        );
    }

    fn handle_get_log_messages(&self, surface: &str, payload: Value) {
        let query: LogQuery = match self.parse(surface, InboundKind::GetLogMessages, payload) {
            Some(q) => q,
            None => return,
        };
        let page = self.log.read(query.offset, query.count);
        let payload = serde_json::to_value(page).unwrap_or(Value::Null);
        self.send(surface, OutboundKind::LogMessages, payload);
    }

    async fn handle_login(&self, surface: &str, payload: Value) {
        let request: LoginRequest = match self.parse(surface, InboundKind::SfLogin, payload) {
            Some(r) => r,
            None => return,
        };
        let redacted = request.redacted();

        let outcome = self
            .client
            .login(&request.url, &request.username, &request.effective_password())
            .await;

        match outcome {
            Ok(success) => {
                // Serialize the registry mutation with any in-flight logout
                // for the same org.
                let lock = self.registry.op_lock(&success.org_id);
                let _guard = lock.lock().await;
                self.registry.register(
                    &success.org_id,
                    OrgSession {
                        instance_url: success.instance_url.clone(),
                        access_token: success.access_token.clone(),
                        user_id: success.user_id.clone(),
                        created_at: Utc::now(),
                    },
                );
                self.record(
                    surface,
                    LogChannel::Info,
                    format!(
                        "Connection Org {} for User {}",
                        success.org_id, success.user_id
                    ),
                );
                self.send(
                    surface,
                    OutboundKind::ResponseLogin,
                    json!({
                        "status": true,
                        "message": "Login Successful",
                        "response": {
                            "organizationId": success.org_id,
                            "id": success.user_id,
                            "instanceUrl": success.instance_url,
                        },
                        "request": redacted,
                    }),
                );
            }
            Err(err) => {
                self.record(surface, LogChannel::Error, format!("Login Failed {err}"));
                self.send(
                    surface,
                    OutboundKind::ResponseLogin,
                    json!({
                        "status": false,
                        "message": "Login Failed",
                        "response": err.to_string(),
                        "request": redacted,
                    }),
                );
            }
        }
    }

    async fn handle_logout(&self, surface: &str, payload: Value) {
        let request: LogoutRequest = match self.parse(surface, InboundKind::SfLogout, payload) {
            Some(r) => r,
            None => return,
        };

        // Held across the remote call: lookup, await, delete must not
        // interleave with another operation on the same org.
        let lock = self.registry.op_lock(&request.org);
        let _guard = lock.lock().await;

        let Some(session) = self.registry.get(&request.org) else {
            let err = GatewayError::UnknownSession(request.org.clone());
            self.record(surface, LogChannel::Error, format!("Logout Failed {err}"));
            self.send(
                surface,
                OutboundKind::ResponseLogout,
                json!({
                    "status": false,
                    "message": "Logout Failed",
                    "response": err.to_string(),
                    "request": { "org": request.org },
                }),
            );
            return;
        };

        match self.client.logout(&session).await {
            Ok(()) => {
                self.registry.remove(&request.org);
                self.record(
                    surface,
                    LogChannel::Info,
                    format!("Logout Successful for Org {}", request.org),
                );
                self.send(
                    surface,
                    OutboundKind::ResponseLogout,
                    json!({
                        "status": true,
                        "message": "Logout Successful",
                        "response": {},
                        "request": { "org": request.org },
                    }),
                );
            }
            Err(err) => {
                // A failed logout does not forget credentials.
                self.record(surface, LogChannel::Error, format!("Logout Failed {err}"));
                self.send(
                    surface,
                    OutboundKind::ResponseLogout,
                    json!({
                        "status": false,
                        "message": "Logout Failed",
                        "response": err.to_string(),
                        "request": { "org": request.org },
                    }),
                );
            }
        }
    }

    fn handle_send_log(&self, surface: &str, payload: Value) {
        let request: SendLogRequest = match self.parse(surface, InboundKind::SendLog, payload) {
            Some(r) => r,
            None => return,
        };
        // Sender identity comes from the transport, never from the payload.
        self.record(surface, LogChannel::from(request.channel), request.message);
    }

    fn handle_find(&self, surface: &str, payload: Value) {
        let request: FindRequest = match self.parse(surface, InboundKind::FindText, payload) {
            Some(r) => r,
            None => return,
        };
        let directive = self.find.execute(surface, &request.text, request.direction);
        let _ = self.find_tx.send(FindCommand {
            surface: surface.to_string(),
            directive,
        });
    }

    /// Tell a surface to open its find controls.
    pub fn jump_to_find(&self, surface: &str) {
        self.send(surface, OutboundKind::StartFind, Value::Null);
    }

    /// Feed a match count from the presentation layer back through the log
    /// channel.
    pub fn report_find_matches(&self, surface: &str, matches: u64) {
        if let Some(entry) = self.find.report_matches(surface, matches) {
            let payload = serde_json::to_value(entry).unwrap_or(Value::Null);
            self.send(CONSOLE_SURFACE, OutboundKind::LogMessage, payload);
        }
    }

    pub fn search(&self) -> &SearchCoordinator {
        &self.find
    }

    // -- internals ----------------------------------------------------------

    /// Parse a request payload, answering a malformed one with a single
    /// generic failure reply. The privileged process never faults on bad
    /// input.
    fn parse<T: DeserializeOwned>(
        &self,
        surface: &str,
        kind: InboundKind,
        payload: Value,
    ) -> Option<T> {
        match serde_json::from_value(payload) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                let err = GatewayError::MalformedRequest {
                    kind,
                    reason: e.to_string(),
                };
                tracing::warn!(%kind, error = %err, "rejecting malformed request");
                self.send(
                    surface,
                    OutboundKind::ResponseGeneric,
                    json!({
                        "status": false,
                        "message": "Malformed request",
                        "response": err.to_string(),
                    }),
                );
                None
            }
        }
    }

    /// Append a diagnostic entry and push it to the console surface.
    fn record(&self, sender: &str, channel: LogChannel, message: impl Into<String>) {
        let entry = self.log.append(sender, channel, message);
        let payload = serde_json::to_value(entry).unwrap_or(Value::Null);
        self.send(CONSOLE_SURFACE, OutboundKind::LogMessage, payload);
    }

    fn send(&self, target: &str, kind: OutboundKind, payload: Value) {
        debug_assert!(is_permitted(Direction::Outbound, kind.as_ref()));
        // Fire-and-forget: a closed transport just loses the event.
        let _ = self.outbound.send(OutboundMessage {
            target: target.to_string(),
            kind,
            payload,
        });
    }
}
