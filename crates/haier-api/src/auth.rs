// Credential manager
//
// Owns the username/password, the persisted token record and the client
// identity. Tokens are read through an in-memory cache backed by disk; an
// expired or missing token triggers a login that concurrent callers share
// (single-flight) instead of each logging in separately.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::client::{SignedHttp, decode};
use crate::endpoints::Endpoints;
use crate::error::Error;
use crate::models::{DataEnvelope, LoginData};
use crate::sign::now_millis;
use crate::storage::CredentialStore;

pub use crate::models::TokenInfo;

/// Device profile reported to the login endpoint.
const PHONE_TYPE: &str = "iPhone16,2";

/// Account credentials for password login.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }
}

/// Cloneable summary of a failed login, shared by every awaiter.
#[derive(Debug, Clone)]
struct LoginFailure {
    code: Option<String>,
    message: String,
}

impl From<&Error> for LoginFailure {
    fn from(err: &Error) -> Self {
        match err {
            Error::Api { code, message } => Self {
                code: Some(code.clone()),
                message: message.clone(),
            },
            Error::Authentication { message } => Self {
                code: None,
                message: message.clone(),
            },
            other => Self {
                code: None,
                message: other.to_string(),
            },
        }
    }
}

impl From<LoginFailure> for Error {
    fn from(failure: LoginFailure) -> Self {
        match failure.code {
            Some(code) => Error::Api {
                code,
                message: failure.message,
            },
            None => Error::Authentication {
                message: failure.message,
            },
        }
    }
}

type LoginFuture = Shared<BoxFuture<'static, Result<Arc<TokenInfo>, LoginFailure>>>;

struct AuthInner {
    credentials: Credentials,
    store: CredentialStore,
    endpoints: Arc<Endpoints>,
    http: SignedHttp,
    token: Mutex<Option<Arc<TokenInfo>>>,
    in_flight: Mutex<Option<LoginFuture>>,
}

/// Token lifecycle and client identity for one account. Cheap to clone.
#[derive(Clone)]
pub struct Authenticator {
    inner: Arc<AuthInner>,
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("username", &self.inner.credentials.username)
            .field("store", &self.inner.store)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Authenticator {
    pub(crate) fn new(
        credentials: Credentials,
        store: CredentialStore,
        endpoints: Arc<Endpoints>,
        http: SignedHttp,
    ) -> Self {
        Self {
            inner: Arc::new(AuthInner {
                credentials,
                store,
                endpoints,
                http,
                token: Mutex::new(None),
                in_flight: Mutex::new(None),
            }),
        }
    }

    pub fn username(&self) -> &str {
        &self.inner.credentials.username
    }

    pub fn store(&self) -> &CredentialStore {
        &self.inner.store
    }

    /// The current token if one is cached (in memory or on disk) and unexpired.
    pub fn token_info(&self) -> Option<Arc<TokenInfo>> {
        let mut cached = lock(&self.inner.token);
        if cached.is_none() {
            *cached = self
                .inner
                .store
                .load_token(self.username())
                .map(Arc::new);
        }
        cached
            .as_ref()
            .filter(|token| token.is_valid_at(now_millis()))
            .cloned()
    }

    /// Resolve an access token, logging in if none is valid.
    ///
    /// Callers arriving while a login is in flight await that same login.
    pub async fn access_token(&self) -> Result<String, Error> {
        let pending = {
            let mut slot = lock(&self.inner.in_flight);
            if let Some(pending) = slot.as_ref() {
                pending.clone()
            } else if let Some(token) = self.token_info() {
                return Ok(token.access_token().to_owned());
            } else {
                let pending = self.start_login();
                *slot = Some(pending.clone());
                pending
            }
        };
        let token = self.await_login(pending).await?;
        Ok(token.access_token().to_owned())
    }

    /// Log in regardless of the cached token, joining any login in flight.
    pub async fn login(&self) -> Result<Arc<TokenInfo>, Error> {
        let pending = lock(&self.inner.in_flight)
            .get_or_insert_with(|| self.start_login())
            .clone();
        self.await_login(pending).await
    }

    /// The durable client identity, created on first use.
    ///
    /// Creating a new identity drops the in-memory token so the next read
    /// goes back to storage.
    pub fn client_id(&self) -> Result<String, Error> {
        let (client_id, created) = self.inner.store.load_or_create_client_id()?;
        if created {
            *lock(&self.inner.token) = None;
            info!("generated new client identity");
        }
        Ok(client_id)
    }

    fn start_login(&self) -> LoginFuture {
        let inner = Arc::clone(&self.inner);
        async move {
            inner
                .perform_login()
                .await
                .map(Arc::new)
                .map_err(|e| LoginFailure::from(&e))
        }
        .boxed()
        .shared()
    }

    async fn await_login(&self, pending: LoginFuture) -> Result<Arc<TokenInfo>, Error> {
        let result = pending.clone().await;
        {
            let mut slot = lock(&self.inner.in_flight);
            if slot.as_ref().is_some_and(|current| current.ptr_eq(&pending)) {
                *slot = None;
            }
        }
        match result {
            Ok(token) => Ok(token),
            Err(failure) => {
                warn!(message = %failure.message, "login failed");
                Err(failure.into())
            }
        }
    }
}

impl AuthInner {
    async fn perform_login(&self) -> Result<TokenInfo, Error> {
        let Credentials { username, password } = &self.credentials;
        if username.is_empty() || password.expose_secret().is_empty() {
            return Err(Error::Authentication {
                message: "username or password is empty".into(),
            });
        }

        debug!(username = %username, "logging in");
        let body = json!({
            "username": username,
            "password": password.expose_secret(),
            "phoneType": PHONE_TYPE,
        });
        let signed = self
            .http
            .send(Method::POST, self.endpoints.login()?, Some(&body), None)
            .await?;
        let envelope: DataEnvelope<LoginData> = decode(signed.body)?;
        let token = envelope.data.token_info.anchored_at(signed.timestamp);

        if let Err(e) = self.store.save_token(username, &token) {
            warn!(error = %e, "failed to persist token, keeping it in memory only");
        }
        *lock(&self.token) = Some(Arc::new(token.clone()));
        info!(username = %username, expires_at = token.expires_at, "login succeeded");
        Ok(token)
    }
}
