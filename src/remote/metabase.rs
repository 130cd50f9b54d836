//! Metabase HTTP client.
//!
//! Talks to the JSON API with a session token in the `X-Metabase-Session`
//! header. When the server answers `Unauthenticated` and credentials were
//! saved at login, the client logs in once, swaps in the fresh session and
//! repeats the request. Callers read the possibly renewed session back via
//! [`MetabaseClient::session`] to persist it.

use std::sync::RwLock;
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{RemoteError, RemoteGateway, RemoteResult};
use crate::model::{Card, CardId};

const USER_AGENT: &str = "MetaBaseSync";
const SESSION_HEADER: &str = "X-Metabase-Session";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// An authenticated Metabase session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
}

impl Session {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

/// Username/password pair used to (re)create a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
}

/// HTTP implementation of [`RemoteGateway`].
pub struct MetabaseClient {
    client: Client,
    base_url: String,
    session: RwLock<Session>,
    credentials: Option<Credentials>,
}

impl MetabaseClient {
    /// Create a client for `base_url` using an existing session.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(base_url: &str, session: Session) -> RemoteResult<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        Ok(Self {
            client: http_client(&base_url)?,
            base_url,
            session: RwLock::new(session),
            credentials: None,
        })
    }

    /// Allow the client to renew an expired session with these credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The current session (renewed if the server expired the original).
    #[must_use]
    pub fn session(&self) -> Session {
        match self.session.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn connection_error(&self, err: &reqwest::Error) -> RemoteError {
        RemoteError::Connection {
            url: self.base_url.clone(),
            message: err.to_string(),
        }
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Card>,
    ) -> RemoteResult<(StatusCode, String)> {
        debug!(%method, path, "Metabase request");
        let mut request = self
            .client
            .request(method, self.url(path))
            .header(SESSION_HEADER, self.session().token);
        if let Some(card) = body {
            request = request.json(card);
        }

        let response = request.send().await.map_err(|e| self.connection_error(&e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.connection_error(&e))?;
        Ok((status, text))
    }

    async fn request_json(
        &self,
        method: Method,
        path: &str,
        body: Option<&Card>,
    ) -> RemoteResult<Value> {
        let (mut status, mut text) = self.call(method.clone(), path, body).await?;

        if is_unauthenticated(status, &text) {
            self.renew().await?;
            (status, text) = self.call(method, path, body).await?;
            if is_unauthenticated(status, &text) {
                return Err(RemoteError::Unauthenticated {
                    url: self.base_url.clone(),
                });
            }
        }

        if !status.is_success() {
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                message: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| RemoteError::Decode(format!("{path}: {e}")))
    }

    async fn renew(&self) -> RemoteResult<()> {
        let Some(credentials) = &self.credentials else {
            return Err(RemoteError::Unauthenticated {
                url: self.base_url.clone(),
            });
        };

        info!(url = %self.base_url, "Session expired, logging in again");
        let session = create_session(&self.client, &self.base_url, credentials).await?;
        match self.session.write() {
            Ok(mut guard) => *guard = session,
            Err(poisoned) => *poisoned.into_inner() = session,
        }
        Ok(())
    }
}

impl RemoteGateway for MetabaseClient {
    async fn list_cards(&self) -> RemoteResult<Vec<Card>> {
        let value = self.request_json(Method::GET, "/api/card", None).await?;
        let Value::Array(items) = value else {
            return Err(RemoteError::Decode(
                "/api/card: expected a list of cards".to_string(),
            ));
        };
        items
            .into_iter()
            .map(|item| {
                Card::from_value(item)
                    .ok_or_else(|| RemoteError::Decode("/api/card: card is not an object".into()))
            })
            .collect()
    }

    async fn get_card(&self, id: CardId) -> RemoteResult<Card> {
        let path = format!("/api/card/{id}");
        let value = self.request_json(Method::GET, &path, None).await?;
        Card::from_value(value)
            .ok_or_else(|| RemoteError::Decode(format!("{path}: card is not an object")))
    }

    async fn update_card(&self, id: CardId, card: &Card) -> RemoteResult<()> {
        let path = format!("/api/card/{id}");
        self.request_json(Method::PUT, &path, Some(card)).await?;
        Ok(())
    }
}

/// Log in with username and password, returning a fresh session.
///
/// # Errors
///
/// Returns [`RemoteError::Rejected`] if the server refuses the credentials.
pub async fn login(base_url: &str, credentials: &Credentials) -> RemoteResult<Session> {
    let base_url = base_url.trim_end_matches('/');
    let client = http_client(base_url)?;
    create_session(&client, base_url, credentials).await
}

async fn create_session(
    client: &Client,
    base_url: &str,
    credentials: &Credentials,
) -> RemoteResult<Session> {
    let connection_error = |e: reqwest::Error| RemoteError::Connection {
        url: base_url.to_string(),
        message: e.to_string(),
    };

    let response = client
        .post(format!("{base_url}/api/session"))
        .json(credentials)
        .send()
        .await
        .map_err(connection_error)?;
    let status = response.status();
    let text = response.text().await.map_err(connection_error)?;

    if status != StatusCode::OK {
        return Err(RemoteError::Rejected {
            status: status.as_u16(),
            message: text,
        });
    }

    let session: SessionResponse = serde_json::from_str(&text)
        .map_err(|e| RemoteError::Decode(format!("/api/session: {e}")))?;
    Ok(Session::new(session.id))
}

fn http_client(base_url: &str) -> RemoteResult<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| RemoteError::Connection {
            url: base_url.to_string(),
            message: e.to_string(),
        })
}

fn is_unauthenticated(status: StatusCode, body: &str) -> bool {
    status == StatusCode::UNAUTHORIZED || body.trim() == "Unauthenticated"
}
