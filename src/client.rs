//! Request pipeline for every backend call.
//!
//! Attaches the stored bearer token, turns transport failures into
//! [`Error::Network`] and non-2xx answers into [`Error::Http`], and handles a
//! 401 with at most one token refresh followed by at most one retry.

use std::sync::Arc;

use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;

use crate::config::ClientConfig;
use crate::error::Error;
use crate::navigation::{Navigator, routes};
use crate::store::{TokenStore, clear_auth_keys, keys};
use crate::types::{
    AuthResponse, LoginRequest, RefreshRequest, RefreshResponse, RegisterRequest, Role, Session,
    TokenPair, User,
};

/// Decoded response of a successful (2xx) call.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ApiResponse {
    pub status: u16,
    /// Response body; `Null` when the server sent nothing.
    pub body: JsonValue,
}

impl ApiResponse {
    /// Decode the body into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolMismatch`] if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(self) -> Result<T, Error> {
        serde_json::from_value(self.body).map_err(Into::into)
    }
}

/// A request kept in replayable form so it can be re-issued after a refresh.
#[derive(Debug, Clone)]
struct ApiRequest {
    method: Method,
    path: String,
    body: Option<JsonValue>,
    params: Vec<(String, String)>,
    // `false` leaves a 2xx body undecoded; the caller does not want it.
    decode: bool,
}

/// Authenticated client for the CRM REST API.
pub struct AuthClient {
    config: ClientConfig,
    http: reqwest::Client,
    store: Arc<dyn TokenStore>,
    navigator: Arc<dyn Navigator>,
    // Held for the duration of a refresh call; at most one is in flight.
    refresh_lock: Mutex<()>,
}

impl AuthClient {
    /// Create a client over the given store and navigator.
    #[must_use]
    pub fn new(
        config: ClientConfig,
        store: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            store,
            navigator,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    #[must_use]
    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    /// Send an authenticated request.
    ///
    /// On a 401 the stored refresh token is exchanged once and the request is
    /// replayed once with the new access token.
    ///
    /// # Errors
    ///
    /// - [`Error::Network`] when no response was received
    /// - [`Error::Http`] for non-2xx responses, including the retried one
    /// - [`Error::SessionExpired`] when the refresh itself was rejected with 401/403
    /// - [`Error::ProtocolMismatch`] when a body is not valid JSON
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<JsonValue>,
        params: &[(&str, &str)],
    ) -> Result<ApiResponse, Error> {
        let req = ApiRequest {
            method,
            path: path.to_owned(),
            body,
            params: params
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
            decode: true,
        };
        self.dispatch(&req).await
    }

    async fn dispatch(&self, req: &ApiRequest) -> Result<ApiResponse, Error> {
        let sent_token = self.access_token()?;
        match self.send(req, sent_token.as_deref()).await {
            Err(Error::Http { status: 401, body }) => {
                let Some(new_token) = self.refresh_after(sent_token.as_deref()).await? else {
                    return Err(Error::Http { status: 401, body });
                };
                tracing::debug!(method = %req.method, path = %req.path, "Retrying after token refresh");
                self.send(req, Some(&new_token)).await
            }
            other => other,
        }
    }

    /// `GET` and decode.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        self.request(Method::GET, path, None, &[]).await?.json()
    }

    /// `GET` with query parameters and decode.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn get_with_params<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, Error> {
        self.request(Method::GET, path, None, params).await?.json()
    }

    /// `POST` a JSON body and decode.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let body = serde_json::to_value(body)?;
        self.request(Method::POST, path, Some(body), &[]).await?.json()
    }

    /// `PUT` a JSON body and decode.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let body = serde_json::to_value(body)?;
        self.request(Method::PUT, path, Some(body), &[]).await?.json()
    }

    /// `PATCH` a JSON body and decode.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let body = serde_json::to_value(body)?;
        self.request(Method::PATCH, path, Some(body), &[]).await?.json()
    }

    /// `DELETE`, discarding any body. A 2xx body is not parsed, so plain-text
    /// confirmations are fine.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn delete(&self, path: &str) -> Result<(), Error> {
        let req = ApiRequest {
            method: Method::DELETE,
            path: path.to_owned(),
            body: None,
            params: Vec::new(),
            decode: false,
        };
        self.dispatch(&req).await.map(|_| ())
    }

    /// Exchange credentials for a session via `POST /auth/login`.
    ///
    /// A 401 here means bad credentials, so no refresh is attempted. The
    /// session is validated against the canonical [`AuthResponse`] shape but
    /// not persisted; that is the session manager's job.
    ///
    /// # Errors
    ///
    /// [`Error::Network`], [`Error::Http`], or [`Error::ProtocolMismatch`].
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, Error> {
        let builder = self
            .http
            .post(self.config.endpoint("/auth/login")?)
            .json(&LoginRequest { email, password });
        self.execute(builder, "login")
            .await?
            .json::<AuthResponse>()?
            .validate()
    }

    /// Create an account via `POST /auth/register`. Does not sign in.
    ///
    /// # Errors
    ///
    /// [`Error::Network`], [`Error::Http`], or [`Error::ProtocolMismatch`].
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: &Role,
    ) -> Result<User, Error> {
        let builder = self
            .http
            .post(self.config.endpoint("/auth/register")?)
            .json(&RegisterRequest {
                name,
                email,
                password,
                role,
            });
        let session = self
            .execute(builder, "register")
            .await?
            .json::<AuthResponse>()?
            .validate()?;
        Ok(session.user)
    }

    /// Persist a freshly issued token pair.
    pub(crate) fn store_tokens(&self, tokens: &TokenPair) -> Result<(), Error> {
        self.store.set(keys::ACCESS_TOKEN, &tokens.access_token)?;
        self.store.set(keys::REFRESH_TOKEN, &tokens.refresh_token)
    }

    fn access_token(&self) -> Result<Option<String>, Error> {
        Ok(self
            .store
            .get(keys::ACCESS_TOKEN)?
            .filter(|t| !t.is_empty()))
    }

    async fn send(&self, req: &ApiRequest, token: Option<&str>) -> Result<ApiResponse, Error> {
        let mut builder = self
            .http
            .request(req.method.clone(), self.config.endpoint(&req.path)?);
        if !req.params.is_empty() {
            builder = builder.query(&req.params);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }
        tracing::debug!(method = %req.method, path = %req.path, "API request");
        let (status, text) = self.fetch(builder, &req.path).await?;
        if !req.decode {
            return Ok(ApiResponse {
                status,
                body: JsonValue::Null,
            });
        }
        decode(status, &text)
    }

    async fn execute(&self, builder: RequestBuilder, label: &str) -> Result<ApiResponse, Error> {
        let (status, text) = self.fetch(builder, label).await?;
        decode(status, &text)
    }

    /// Send and read the body; non-2xx becomes [`Error::Http`].
    async fn fetch(&self, builder: RequestBuilder, label: &str) -> Result<(u16, String), Error> {
        let response = builder
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| network_error(&e, label))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| network_error(&e, label))?;

        if !status.is_success() {
            tracing::debug!(request = label, status = status.as_u16(), "API error response");
            return Err(Error::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok((status.as_u16(), text))
    }

    /// Obtain a usable access token after `stale` was rejected.
    ///
    /// `Ok(None)` means no refresh token is stored and the original 401
    /// should stand.
    async fn refresh_after(&self, stale: Option<&str>) -> Result<Option<String>, Error> {
        let _guard = self.refresh_lock.lock().await;

        // Another request rotated the token while this one waited for the lock.
        if let Some(current) = self.access_token()? {
            if stale != Some(current.as_str()) {
                tracing::debug!("Reusing token from concurrent refresh");
                return Ok(Some(current));
            }
        }

        let Some(refresh_token) = self
            .store
            .get(keys::REFRESH_TOKEN)?
            .filter(|t| !t.is_empty())
        else {
            tracing::debug!("No refresh token stored, propagating 401");
            return Ok(None);
        };

        let builder = self
            .http
            .post(self.config.endpoint(&self.config.refresh_path)?)
            .json(&RefreshRequest {
                refresh_token: &refresh_token,
            });

        let refreshed = match self.execute(builder, "token refresh").await {
            Ok(response) => response.json::<RefreshResponse>(),
            Err(e) => Err(e),
        };

        match refreshed {
            Ok(tokens) if !tokens.access_token.is_empty() => {
                self.store_tokens(&tokens)?;
                tracing::info!("Access token refreshed");
                Ok(Some(tokens.access_token))
            }
            Ok(_) => Err(Error::ProtocolMismatch("empty accessToken in refresh response".into())),
            Err(Error::Http {
                status: status @ (401 | 403),
                ..
            }) => {
                tracing::warn!(status, "Refresh rejected, session expired");
                self.expire_session();
                Err(Error::SessionExpired)
            }
            Err(e) => {
                // Transient failures keep the session.
                tracing::warn!(error = %e, "Token refresh failed, keeping session");
                Err(e)
            }
        }
    }

    fn expire_session(&self) {
        if let Err(e) = clear_auth_keys(self.store.as_ref()) {
            tracing::error!(error = %e, "Failed to clear expired session");
        }

        let delay = self.config.expiry_redirect_delay;
        if delay.is_zero() {
            self.navigator.navigate(routes::LOGIN);
            return;
        }
        let navigator = Arc::clone(&self.navigator);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            navigator.navigate(routes::LOGIN);
        });
    }
}

fn decode(status: u16, text: &str) -> Result<ApiResponse, Error> {
    let body = if text.trim().is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_str(text)?
    };
    Ok(ApiResponse { status, body })
}

fn network_error(e: &reqwest::Error, label: &str) -> Error {
    tracing::warn!(request = label, error = %e, "Network error");
    if e.is_timeout() {
        Error::Network(format!("{label}: request timed out"))
    } else {
        Error::Network(format!("{label}: server unreachable"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::NoopNavigator;
    use crate::store::MemoryStore;

    fn client_with(store: Arc<MemoryStore>) -> AuthClient {
        AuthClient::new(ClientConfig::default(), store, Arc::new(NoopNavigator))
    }

    #[test]
    fn empty_access_token_counts_as_absent() {
        let store = Arc::new(MemoryStore::new());
        store.set(keys::ACCESS_TOKEN, "").unwrap();
        assert_eq!(client_with(store).access_token().unwrap(), None);
    }

    #[test]
    fn store_tokens_writes_both_keys() {
        let store = Arc::new(MemoryStore::new());
        let client = client_with(Arc::clone(&store));
        client
            .store_tokens(&TokenPair {
                access_token: "a".into(),
                refresh_token: "r".into(),
            })
            .unwrap();
        assert_eq!(store.get(keys::ACCESS_TOKEN).unwrap().as_deref(), Some("a"));
        assert_eq!(store.get(keys::REFRESH_TOKEN).unwrap().as_deref(), Some("r"));
    }

    #[test]
    fn api_response_null_body_decodes_to_unit() {
        let response = ApiResponse {
            status: 204,
            body: JsonValue::Null,
        };
        response.json::<()>().unwrap();
    }

    #[test]
    fn api_response_shape_error_is_protocol_mismatch() {
        let response = ApiResponse {
            status: 200,
            body: serde_json::json!({ "unexpected": true }),
        };
        assert!(matches!(
            response.json::<TokenPair>(),
            Err(Error::ProtocolMismatch(_))
        ));
    }
}
