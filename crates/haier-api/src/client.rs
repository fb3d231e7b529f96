// Signed HTTP client
//
// Wraps `reqwest::Client` with per-request signing and `retCode` envelope
// checking. Endpoint methods (families, devices, commands) are implemented
// as inherent methods on `HaierClient` in separate files to keep this module
// focused on transport mechanics.

use std::sync::Arc;

use reqwest::Method;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::auth::{Authenticator, Credentials};
use crate::endpoints::Endpoints;
use crate::error::Error;
use crate::models::{RET_CODE_SUCCESS, RetEnvelope, TokenInfo};
use crate::sign::{now_millis, sequence_id, sign_request};
use crate::storage::CredentialStore;
use crate::transport::TransportConfig;

/// A response body that passed the envelope check, plus the timestamp the
/// request was signed with.
#[derive(Debug)]
pub(crate) struct Signed {
    pub body: Value,
    pub timestamp: i64,
}

/// Low-level signer shared by the authenticator and the endpoint client.
#[derive(Debug, Clone)]
pub(crate) struct SignedHttp {
    http: reqwest::Client,
}

impl SignedHttp {
    pub(crate) fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Sign and send one request, returning the envelope-checked body.
    ///
    /// `token` is `None` only for login.
    pub(crate) async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<Signed, Error> {
        let payload = body.map(Value::to_string).unwrap_or_default();
        let timestamp = now_millis();

        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .header("timestamp", timestamp.to_string())
            .header("sequenceId", sequence_id(timestamp))
            .header("sign", sign_request(&url, &payload, timestamp));
        if let Some(token) = token {
            request = request.header("accessToken", token);
        }
        if body.is_some() {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(payload);
        }

        debug!(%method, %url, "request");
        let resp = request.send().await.map_err(Error::Transport)?;
        let body = parse_envelope(resp).await?;
        Ok(Signed { body, timestamp })
    }
}

/// Parse the `{ retCode, retInfo, data }` envelope, returning the whole body
/// on success or `Error::Api` when `retCode` is not `"00000"`.
async fn parse_envelope(resp: reqwest::Response) -> Result<Value, Error> {
    let status = resp.status();
    let text = resp.text().await.map_err(Error::Transport)?;

    let body: Value = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(e) if status.is_success() => {
            return Err(Error::Deserialization {
                message: e.to_string(),
                body: text,
            });
        }
        Err(_) => {
            return Err(Error::Api {
                code: status.as_u16().to_string(),
                message: status
                    .canonical_reason()
                    .unwrap_or("unexpected HTTP status")
                    .to_owned(),
            });
        }
    };

    let envelope: RetEnvelope =
        serde_json::from_value(body.clone()).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: text.clone(),
        })?;

    match envelope.ret_code.as_deref() {
        Some(RET_CODE_SUCCESS) => Ok(body),
        code => {
            let code = code.unwrap_or_default().to_owned();
            let message = envelope.ret_info.unwrap_or_default();
            warn!(%status, code = %code, message = %message, "request rejected");
            Err(Error::Api { code, message })
        }
    }
}

/// Deserialize an envelope-checked body into `T`, keeping the raw body on failure.
pub(crate) fn decode<T: DeserializeOwned>(body: Value) -> Result<T, Error> {
    serde_json::from_value(body.clone()).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: body.to_string(),
    })
}

/// Client for the Haier U+ cloud.
///
/// Every call resolves an access token through the shared [`Authenticator`]
/// (logging in on demand), signs the request and unwraps the envelope.
/// Cheap to clone.
#[derive(Debug, Clone)]
pub struct HaierClient {
    http: SignedHttp,
    endpoints: Arc<Endpoints>,
    auth: Authenticator,
}

impl HaierClient {
    pub fn new(
        credentials: Credentials,
        store: CredentialStore,
        endpoints: Endpoints,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = SignedHttp::new(transport.build_client()?);
        let endpoints = Arc::new(endpoints);
        let auth = Authenticator::new(credentials, store, Arc::clone(&endpoints), http.clone());
        Ok(Self {
            http,
            endpoints,
            auth,
        })
    }

    /// The credential manager backing this client.
    pub fn auth(&self) -> &Authenticator {
        &self.auth
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Force a fresh login and persist the resulting token.
    pub async fn login(&self) -> Result<Arc<TokenInfo>, Error> {
        self.auth.login().await
    }

    // ── Request helpers ──────────────────────────────────────────────

    pub(crate) async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        self.call(Method::GET, url, None).await
    }

    pub(crate) async fn post<T: DeserializeOwned>(&self, url: Url, body: &Value) -> Result<T, Error> {
        self.call(Method::POST, url, Some(body)).await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<T, Error> {
        let token = self.auth.access_token().await?;
        let signed = self.http.send(method, url, body, Some(&token)).await?;
        decode(signed.body)
    }
}
