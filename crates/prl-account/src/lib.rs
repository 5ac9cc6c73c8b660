//! User-account adapter.
//!
//! Speaks JSON over HTTP to an account gateway that holds the actual Telegram
//! user connection. The gateway hands out an opaque session token at login; it
//! is kept in `SESSION_FILE` and sent as a bearer token on every call.

pub mod session;
mod wire;

use std::{sync::RwLock, time::Duration};

use async_trait::async_trait;
use prl_core::{
    auth::{AuthBackend, SignInStep, SignUpInfo},
    config::Config,
    domain::{Presence, UserId},
    errors::Error,
    ports::AccountClient,
    Result,
};
use serde::{de::DeserializeOwned, de::IgnoredAny, Serialize};
use tracing::{debug, info};

use crate::session::SessionFile;

/// Dialogs fetched per `/chats` request.
pub const DIALOG_LIMIT: usize = 50;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct GatewayClient {
    base_url: String,
    api_id: i32,
    api_hash: String,
    session_file: SessionFile,
    session: RwLock<Option<String>>,
    http: reqwest::Client,
}

impl GatewayClient {
    /// Build a client and pick up a previously stored session, if any.
    pub fn new(cfg: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::External(format!("http client build error: {e}")))?;

        let session_file = SessionFile::new(&cfg.session_file);
        let session = session_file.load()?;
        debug!(
            path = %session_file.path().display(),
            stored = session.is_some(),
            "session file loaded"
        );

        Ok(Self {
            base_url: cfg.account_gateway_url.trim_end_matches('/').to_string(),
            api_id: cfg.api_id,
            api_hash: cfg.api_hash.clone(),
            session_file,
            session: RwLock::new(session),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn session(&self) -> Option<String> {
        self.session.read().ok().and_then(|s| s.clone())
    }

    fn set_session(&self, token: String) {
        if let Ok(mut slot) = self.session.write() {
            *slot = Some(token);
        }
    }

    fn persist_session(&self) -> Result<()> {
        let token = self
            .session()
            .ok_or_else(|| Error::Auth("no login in progress".to_string()))?;
        self.session_file.store(&token)?;
        info!(path = %self.session_file.path().display(), "session saved");
        Ok(())
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.session() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let req = self.authed(self.http.get(self.url(path)));
        send(req, path).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let req = self.authed(self.http.post(self.url(path))).json(body);
        send(req, path).await
    }
}

async fn send<T: DeserializeOwned>(req: reqwest::RequestBuilder, path: &str) -> Result<T> {
    let resp = req
        .send()
        .await
        .map_err(|e| Error::External(format!("gateway request error ({path}): {e}")))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::External(format!(
            "gateway {path} failed: {status} {}",
            body.chars().take(200).collect::<String>()
        )));
    }

    resp.json()
        .await
        .map_err(|e| Error::External(format!("gateway json error ({path}): {e}")))
}

#[async_trait]
impl AccountClient for GatewayClient {
    async fn user_presence(&self, user_id: UserId) -> Result<Presence> {
        let status: wire::UserStatus = self
            .get_json(&format!("/v1/users/{}/status", user_id.0))
            .await?;
        Ok(status.into_presence())
    }

    async fn list_dialogs(&self) -> Result<Vec<String>> {
        let dialogs: wire::Dialogs = self
            .get_json(&format!("/v1/dialogs?limit={DIALOG_LIMIT}"))
            .await?;
        Ok(dialogs.into_titles())
    }
}

#[async_trait]
impl AuthBackend for GatewayClient {
    async fn is_authorized(&self) -> Result<bool> {
        if self.session().is_none() {
            return Ok(false);
        }
        let status: wire::AuthStatus = self.get_json("/v1/auth/status").await?;
        Ok(status.authorized)
    }

    async fn request_code(&self, phone: &str) -> Result<()> {
        let pending: wire::Pending = self
            .post_json(
                "/v1/auth/send-code",
                &wire::SendCode {
                    phone,
                    api_id: self.api_id,
                    api_hash: &self.api_hash,
                },
            )
            .await?;
        self.set_session(pending.session);
        info!("login code requested");
        Ok(())
    }

    async fn sign_in(&self, code: &str) -> Result<SignInStep> {
        let reply: wire::SignInReply = self
            .post_json("/v1/auth/sign-in", &wire::SignIn { code })
            .await?;
        let step = reply.into_step()?;
        if step == SignInStep::Authorized {
            self.persist_session()?;
        }
        Ok(step)
    }

    async fn check_password(&self, password: &str) -> Result<()> {
        let _: IgnoredAny = self
            .post_json("/v1/auth/password", &wire::Password { password })
            .await?;
        self.persist_session()
    }

    async fn sign_up(&self, info: &SignUpInfo) -> Result<()> {
        let _: IgnoredAny = self
            .post_json(
                "/v1/auth/sign-up",
                &wire::SignUp {
                    first_name: &info.first_name,
                    last_name: &info.last_name,
                },
            )
            .await?;
        self.persist_session()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &std::path::Path, gateway: &str) -> Config {
        let session = dir.join("session.data");
        let session = session.to_str().unwrap().to_string();
        let gateway = gateway.to_string();
        Config::from_lookup(move |k| match k {
            "TELEGRAM_API_ID" => Some("12345".to_string()),
            "TELEGRAM_API_HASH" => Some("abcdef".to_string()),
            "TELEGRAM_BOT_TOKEN" => Some("123:tok".to_string()),
            "DEFAULT_SPY_USER_ID" => Some("42".to_string()),
            "SESSION_FILE" => Some(session.clone()),
            "ACCOUNT_GATEWAY_URL" => Some(gateway.clone()),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn urls_join_without_double_slash() {
        let dir = tempfile::tempdir().unwrap();
        let client = GatewayClient::new(&config(dir.path(), "http://gw.local:8081/")).unwrap();
        assert_eq!(
            client.url("/v1/auth/status"),
            "http://gw.local:8081/v1/auth/status"
        );
    }

    #[tokio::test]
    async fn fresh_install_is_not_authorized_without_network() {
        let dir = tempfile::tempdir().unwrap();
        // Unroutable gateway: the check must short-circuit on the missing session.
        let client = GatewayClient::new(&config(dir.path(), "http://127.0.0.1:9")).unwrap();
        assert!(!client.is_authorized().await.unwrap());
    }

    #[test]
    fn stored_session_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), "http://127.0.0.1:9");
        SessionFile::new(&cfg.session_file).store("tok-1").unwrap();

        let client = GatewayClient::new(&cfg).unwrap();
        assert_eq!(client.session().as_deref(), Some("tok-1"));
    }

    #[test]
    fn persisting_without_login_is_an_auth_error() {
        let dir = tempfile::tempdir().unwrap();
        let client = GatewayClient::new(&config(dir.path(), "http://127.0.0.1:9")).unwrap();
        assert!(matches!(client.persist_session(), Err(Error::Auth(_))));

        client.set_session("pending".to_string());
        client.persist_session().unwrap();
        let stored = SessionFile::new(dir.path().join("session.data")).load().unwrap();
        assert_eq!(stored.as_deref(), Some("pending"));
    }
}
