//! Account sign-in flow.
//!
//! The flow is driven here against two ports: `AuthBackend` (the account API) and
//! `CredentialProvider` (whoever answers the questions: a terminal, a script, a test).

use async_trait::async_trait;
use tokio::{
    io::{
        self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout,
    },
    sync::Mutex,
};
use tracing::info;

use crate::{errors::Error, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignUpInfo {
    pub first_name: String,
    pub last_name: String,
}

/// Answers the questions asked during sign-in.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn phone(&self) -> Result<String>;
    async fn code(&self) -> Result<String>;
    async fn password(&self, hint: Option<&str>) -> Result<String>;
    async fn sign_up(&self) -> Result<SignUpInfo>;
    /// Return `Ok(())` only if the terms were accepted.
    async fn accept_terms_of_service(&self, terms: &str) -> Result<()>;
}

/// What the account API asks for after a login code was submitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignInStep {
    Authorized,
    PasswordRequired { hint: Option<String> },
    SignUpRequired { terms_of_service: Option<String> },
}

/// Account-side half of the sign-in flow.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn is_authorized(&self) -> Result<bool>;
    async fn request_code(&self, phone: &str) -> Result<()>;
    async fn sign_in(&self, code: &str) -> Result<SignInStep>;
    async fn check_password(&self, password: &str) -> Result<()>;
    async fn sign_up(&self, info: &SignUpInfo) -> Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthOutcome {
    AlreadyAuthorized,
    SignedIn,
    SignedUp,
}

/// Sign in if the stored session is not authorized yet.
pub async fn authenticate(
    backend: &dyn AuthBackend,
    creds: &dyn CredentialProvider,
) -> Result<AuthOutcome> {
    if backend.is_authorized().await? {
        info!("account session already authorized");
        return Ok(AuthOutcome::AlreadyAuthorized);
    }

    info!("account authorization required");
    let phone = creds.phone().await?;
    backend.request_code(phone.trim()).await?;

    let code = creds.code().await?;
    let outcome = match backend.sign_in(code.trim()).await? {
        SignInStep::Authorized => AuthOutcome::SignedIn,
        SignInStep::PasswordRequired { hint } => {
            let password = creds.password(hint.as_deref()).await?;
            backend.check_password(&password).await?;
            AuthOutcome::SignedIn
        }
        SignInStep::SignUpRequired { terms_of_service } => {
            let info = creds.sign_up().await?;
            if let Some(terms) = terms_of_service {
                creds.accept_terms_of_service(&terms).await?;
            }
            backend.sign_up(&info).await?;
            AuthOutcome::SignedUp
        }
    };

    info!(?outcome, "account authorized");
    Ok(outcome)
}

/// Asks questions on a writer and reads one-line answers from a reader.
pub struct PromptCredentials<R, W> {
    io: Mutex<(R, W)>,
}

/// Prompts on stdout and reads answers from stdin.
pub type TerminalCredentials = PromptCredentials<BufReader<Stdin>, Stdout>;

impl<R, W> PromptCredentials<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn with_io(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new((reader, writer)),
        }
    }

    async fn say(&self, text: &str) -> Result<()> {
        let mut io = self.io.lock().await;
        let (_, writer) = &mut *io;
        writer.write_all(text.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn prompt(&self, question: &str) -> Result<String> {
        let mut io = self.io.lock().await;
        let (reader, writer) = &mut *io;

        writer.write_all(question.as_bytes()).await?;
        writer.flush().await?;

        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(Error::Auth("input closed while waiting for an answer".to_string()));
        }
        Ok(line.trim().to_string())
    }
}

impl TerminalCredentials {
    pub fn new() -> Self {
        Self::with_io(BufReader::new(io::stdin()), io::stdout())
    }
}

impl Default for TerminalCredentials {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R, W> CredentialProvider for PromptCredentials<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn phone(&self) -> Result<String> {
        self.prompt("Enter phone number: ").await
    }

    async fn code(&self) -> Result<String> {
        self.prompt("Enter the code sent by Telegram: ").await
    }

    async fn password(&self, hint: Option<&str>) -> Result<String> {
        match hint {
            Some(h) => self.prompt(&format!("Enter password (hint: {h}): ")).await,
            None => self.prompt("Enter password: ").await,
        }
    }

    async fn sign_up(&self) -> Result<SignUpInfo> {
        let first_name = self.prompt("Enter first name: ").await?;
        let last_name = self.prompt("Enter last name: ").await?;
        Ok(SignUpInfo {
            first_name,
            last_name,
        })
    }

    async fn accept_terms_of_service(&self, terms: &str) -> Result<()> {
        self.say(&format!("Terms of service:\n{terms}\n")).await?;
        let answer = self.prompt("Accept? (yes/no): ").await?;
        if answer.eq_ignore_ascii_case("yes") {
            return Ok(());
        }
        Err(Error::Auth(
            "terms of service were not accepted".to_string(),
        ))
    }
}
