//! Gateway request/response bodies and their mapping onto core types.

use prl_core::{auth::SignInStep, domain::Presence, errors::Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub(crate) struct AuthStatus {
    pub authorized: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct SendCode<'a> {
    pub phone: &'a str,
    pub api_id: i32,
    pub api_hash: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Pending {
    pub session: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct SignIn<'a> {
    pub code: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SignInReply {
    pub step: String,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default)]
    pub terms_of_service: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Password<'a> {
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct SignUp<'a> {
    pub first_name: &'a str,
    pub last_name: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserStatus {
    pub status: String,
    #[serde(default)]
    pub was_online: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Dialogs {
    #[serde(default)]
    pub dialogs: Vec<Dialog>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Dialog {
    pub kind: String,
    #[serde(default)]
    pub title: String,
}

impl SignInReply {
    pub fn into_step(self) -> Result<SignInStep> {
        match self.step.as_str() {
            "authorized" => Ok(SignInStep::Authorized),
            "password_required" => Ok(SignInStep::PasswordRequired { hint: self.hint }),
            "sign_up_required" => Ok(SignInStep::SignUpRequired {
                terms_of_service: self.terms_of_service,
            }),
            other => Err(Error::Auth(format!("unexpected sign-in step: {other}"))),
        }
    }
}

impl UserStatus {
    /// Only an offline status carries a timestamp; every other status counts as online.
    pub fn into_presence(self) -> Presence {
        match (self.status.as_str(), self.was_online) {
            ("offline", Some(at)) => Presence::OfflineSince(at),
            _ => Presence::Online,
        }
    }
}

impl Dialogs {
    /// Group chats only, labelled by access.
    pub fn into_titles(self) -> Vec<String> {
        self.dialogs
            .into_iter()
            .filter_map(|d| match d.kind.as_str() {
                "group" => Some(format!("Group: {}", d.title)),
                "forbidden_group" => Some(format!("Forbidden group: {}", d.title)),
                _ => None,
            })
            .collect()
    }
}
