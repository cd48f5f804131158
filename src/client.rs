//! Remote org service client.
//!
//! The gateway treats the CRM service as an opaque collaborator behind the
//! [`OrgClient`] trait: login yields session material, logout invalidates it,
//! query runs SOQL against an authenticated session. [`HttpOrgClient`] is the
//! real implementation speaking the Salesforce-style wire protocol; tests use
//! a scripted mock. Timeout policy lives here, never in the gateway.

use crate::session::OrgSession;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Session material returned by a successful remote login.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginSuccess {
    pub org_id: String,
    pub user_id: String,
    pub instance_url: String,
    pub access_token: String,
}

#[derive(Debug, Error)]
pub enum ClientError {
    /// The call never produced a usable answer (network, malformed body).
    #[error("remote call failed: {0}")]
    Transport(String),
    /// The service answered and said no (bad credentials, expired session).
    #[error("{0}")]
    Rejected(String),
}

/// Asynchronous contract of the remote org service.
#[async_trait]
pub trait OrgClient: Send + Sync {
    /// Authenticate with already-concatenated credentials (the caller appends
    /// the security token to the password when one is present).
    async fn login(
        &self,
        login_url: &str,
        username: &str,
        password: &str,
    ) -> Result<LoginSuccess, ClientError>;

    /// Invalidate the session's token on the remote side.
    async fn logout(&self, session: &OrgSession) -> Result<(), ClientError>;

    /// Run a SOQL query, returning the raw record objects.
    async fn query(
        &self,
        session: &OrgSession,
        soql: &str,
    ) -> Result<Vec<serde_json::Value>, ClientError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

const API_VERSION: &str = "62.0";
const REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the Salesforce-style SOAP login / REST query wire protocol.
pub struct HttpOrgClient {
    http: reqwest::Client,
}

impl HttpOrgClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpOrgClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Escape a credential for embedding in the SOAP envelope.
fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn soap_login_envelope(username: &str, password: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<env:Envelope xmlns:xsd="http://www.w3.org/2001/XMLSchema" "#,
            r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" "#,
            r#"xmlns:env="http://schemas.xmlsoap.org/soap/envelope/">"#,
            r#"<env:Body><n1:login xmlns:n1="urn:partner.soap.sforce.com">"#,
            "<n1:username>{}</n1:username><n1:password>{}</n1:password>",
            "</n1:login></env:Body></env:Envelope>"
        ),
        xml_escape(username),
        xml_escape(password)
    )
}

/// Pull the text content of a simple (non-nested) XML tag out of a response
/// body. The login response is flat enough that a full XML parser buys
/// nothing here.
fn extract_tag(body: &str, tag: &str) -> Option<String> {
    let re = Regex::new(&format!("<(?:[A-Za-z0-9]+:)?{tag}>([^<]*)</(?:[A-Za-z0-9]+:)?{tag}>"))
        .ok()?;
    re.captures(body).map(|c| c[1].to_string())
}

/// The serverUrl in a login response points at the SOAP endpoint on the org's
/// instance; the instance origin is everything before `/services/`.
fn instance_url_from_server_url(server_url: &str) -> String {
    match server_url.find("/services/") {
        Some(idx) => server_url[..idx].to_string(),
        None => server_url.trim_end_matches('/').to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    records: Vec<serde_json::Value>,
}

#[async_trait]
impl OrgClient for HttpOrgClient {
    async fn login(
        &self,
        login_url: &str,
        username: &str,
        password: &str,
    ) -> Result<LoginSuccess, ClientError> {
        let url = format!(
            "{}/services/Soap/u/{API_VERSION}",
            login_url.trim_end_matches('/')
        );
        let response = self
            .http
            .post(&url)
            .timeout(REMOTE_TIMEOUT)
            .header("Content-Type", "text/xml; charset=UTF-8")
            .header("SOAPAction", "\"\"")
            .body(soap_login_envelope(username, password))
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        if let Some(fault) = extract_tag(&body, "faultstring") {
            return Err(ClientError::Rejected(fault));
        }
        if !status.is_success() {
            return Err(ClientError::Transport(format!(
                "login endpoint answered {status}"
            )));
        }

        let access_token = extract_tag(&body, "sessionId")
            .ok_or_else(|| ClientError::Transport("login response missing sessionId".into()))?;
        let server_url = extract_tag(&body, "serverUrl")
            .ok_or_else(|| ClientError::Transport("login response missing serverUrl".into()))?;
        let org_id = extract_tag(&body, "organizationId")
            .ok_or_else(|| ClientError::Transport("login response missing organizationId".into()))?;
        let user_id = extract_tag(&body, "userId").unwrap_or_default();

        Ok(LoginSuccess {
            org_id,
            user_id,
            instance_url: instance_url_from_server_url(&server_url),
            access_token,
        })
    }

    async fn logout(&self, session: &OrgSession) -> Result<(), ClientError> {
        let url = format!("{}/services/oauth2/revoke", session.instance_url);
        let response = self
            .http
            .post(&url)
            .timeout(REMOTE_TIMEOUT)
            .form(&[("token", session.access_token.as_str())])
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ClientError::Rejected(format!(
                "token revocation answered {}",
                response.status()
            )))
        }
    }

    async fn query(
        &self,
        session: &OrgSession,
        soql: &str,
    ) -> Result<Vec<serde_json::Value>, ClientError> {
        let url = format!(
            "{}/services/data/v{API_VERSION}/query",
            session.instance_url
        );
        let response = self
            .http
            .get(&url)
            .timeout(REMOTE_TIMEOUT)
            .query(&[("q", soql)])
            .bearer_auth(&session.access_token)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Rejected(format!(
                "query answered {status}: {body}"
            )));
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(parsed.records)
    }
}

// ---------------------------------------------------------------------------
// Scripted mock for gateway tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use tokio::sync::oneshot;

    /// Records of a single login attempt as seen by the remote side.
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct LoginAttempt {
        pub url: String,
        pub username: String,
        pub password: String,
    }

    /// OrgClient with scripted outcomes. Calls pop the next queued result;
    /// a gated login parks until the test releases it, for interleaving
    /// scenarios.
    #[derive(Default)]
    pub(crate) struct MockOrgClient {
        login_results: Mutex<VecDeque<Result<LoginSuccess, ClientError>>>,
        logout_results: Mutex<VecDeque<Result<(), ClientError>>>,
        login_gate: Mutex<Option<oneshot::Receiver<()>>>,
        pub(crate) login_attempts: Mutex<Vec<LoginAttempt>>,
        pub(crate) logout_calls: Mutex<usize>,
    }

    impl MockOrgClient {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn push_login_ok(&self, org_id: &str, user_id: &str) {
            self.login_results.lock().push_back(Ok(LoginSuccess {
                org_id: org_id.to_string(),
                user_id: user_id.to_string(),
                instance_url: "https://na1.example.com".to_string(),
                access_token: format!("token-for-{org_id}"),
            }));
        }

        pub(crate) fn push_login_err(&self, message: &str) {
            self.login_results
                .lock()
                .push_back(Err(ClientError::Rejected(message.to_string())));
        }

        pub(crate) fn push_logout_ok(&self) {
            self.logout_results.lock().push_back(Ok(()));
        }

        pub(crate) fn push_logout_err(&self, message: &str) {
            self.logout_results
                .lock()
                .push_back(Err(ClientError::Rejected(message.to_string())));
        }

        /// Park the next login until the returned sender fires.
        pub(crate) fn gate_next_login(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            *self.login_gate.lock() = Some(rx);
            tx
        }
    }

    #[async_trait]
    impl OrgClient for MockOrgClient {
        async fn login(
            &self,
            login_url: &str,
            username: &str,
            password: &str,
        ) -> Result<LoginSuccess, ClientError> {
            self.login_attempts.lock().push(LoginAttempt {
                url: login_url.to_string(),
                username: username.to_string(),
                password: password.to_string(),
            });
            let gate = self.login_gate.lock().take();
            if let Some(rx) = gate {
                let _ = rx.await;
            }
            self.login_results
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(ClientError::Transport("no scripted login result".into())))
        }

        async fn logout(&self, _session: &OrgSession) -> Result<(), ClientError> {
            *self.logout_calls.lock() += 1;
            self.logout_results
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(ClientError::Transport("no scripted logout result".into())))
        }

        async fn query(
            &self,
            _session: &OrgSession,
            _soql: &str,
        ) -> Result<Vec<serde_json::Value>, ClientError> {
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn session(instance_url: &str) -> OrgSession {
        OrgSession {
            instance_url: instance_url.to_string(),
            access_token: "00Dxx!token".to_string(),
            user_id: "005xx".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn xml_escape_covers_credential_metacharacters() {
        assert_eq!(xml_escape("p<a>&'\"s"), "p&lt;a&gt;&amp;&apos;&quot;s");
        assert_eq!(xml_escape("plain"), "plain");
    }

    #[test]
    fn envelope_embeds_escaped_credentials() {
        let envelope = soap_login_envelope("user@example.com", "p&ss");
        assert!(envelope.contains("<n1:username>user@example.com</n1:username>"));
        assert!(envelope.contains("<n1:password>p&amp;ss</n1:password>"));
    }

    #[test]
    fn extract_tag_handles_namespaced_and_plain_tags() {
        let body = "<soapenv:Body><result><sessionId>abc123</sessionId>\
                    <sf:organizationId>00Dxx</sf:organizationId></result></soapenv:Body>";
        assert_eq!(extract_tag(body, "sessionId").as_deref(), Some("abc123"));
        assert_eq!(extract_tag(body, "organizationId").as_deref(), Some("00Dxx"));
        assert_eq!(extract_tag(body, "serverUrl"), None);
    }

    #[test]
    fn instance_url_strips_soap_path() {
        assert_eq!(
            instance_url_from_server_url(
                "https://na1.example.com/services/Soap/u/62.0/00Dxx"
            ),
            "https://na1.example.com"
        );
        assert_eq!(
            instance_url_from_server_url("https://na1.example.com/"),
            "https://na1.example.com"
        );
    }

    fn login_response_xml(server_url: &str) -> String {
        format!(
            "<soapenv:Envelope><soapenv:Body><loginResponse><result>\
             <serverUrl>{server_url}</serverUrl>\
             <sessionId>sess-token</sessionId>\
             <userInfo><organizationId>00Dxx0000001</organizationId>\
             <userId>005xx0000001</userId></userInfo>\
             </result></loginResponse></soapenv:Body></soapenv:Envelope>"
        )
    }

    #[tokio::test]
    async fn login_parses_session_material() {
        let mut server = mockito::Server::new_async().await;
        let server_url = format!("{}/services/Soap/u/62.0/00Dxx", server.url());
        let mock = server
            .mock("POST", "/services/Soap/u/62.0")
            .with_status(200)
            .with_body(login_response_xml(&server_url))
            .create_async()
            .await;

        let client = HttpOrgClient::new();
        let success = client
            .login(&server.url(), "user@example.com", "secret")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(success.org_id, "00Dxx0000001");
        assert_eq!(success.user_id, "005xx0000001");
        assert_eq!(success.access_token, "sess-token");
        assert_eq!(success.instance_url, server.url());
    }

    #[tokio::test]
    async fn login_fault_is_rejected_with_fault_text() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/services/Soap/u/62.0")
            .with_status(500)
            .with_body(
                "<soapenv:Envelope><soapenv:Body><soapenv:Fault>\
                 <faultcode>INVALID_LOGIN</faultcode>\
                 <faultstring>Invalid username, password, security token</faultstring>\
                 </soapenv:Fault></soapenv:Body></soapenv:Envelope>",
            )
            .create_async()
            .await;

        let client = HttpOrgClient::new();
        let err = client
            .login(&server.url(), "user@example.com", "wrong")
            .await
            .unwrap_err();

        match err {
            ClientError::Rejected(msg) => {
                assert!(msg.contains("Invalid username"), "{msg}")
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn logout_revokes_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/services/oauth2/revoke")
            .with_status(200)
            .create_async()
            .await;

        let client = HttpOrgClient::new();
        client.logout(&session(&server.url())).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn logout_failure_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/services/oauth2/revoke")
            .with_status(400)
            .create_async()
            .await;

        let client = HttpOrgClient::new();
        let err = client.logout(&session(&server.url())).await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected(_)));
    }

    #[tokio::test]
    async fn query_returns_records() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/services/data/v62.0/query")
            .match_query(mockito::Matcher::UrlEncoded(
                "q".into(),
                "SELECT Id FROM Account".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"totalSize":1,"done":true,"records":[{"Id":"001xx"}]}"#)
            .create_async()
            .await;

        let client = HttpOrgClient::new();
        let records = client
            .query(&session(&server.url()), "SELECT Id FROM Account")
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["Id"], "001xx");
    }
}
