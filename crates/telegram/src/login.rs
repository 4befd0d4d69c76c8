//! Interactive authorization of the user session.

use {
    async_trait::async_trait,
    grammers_client::SignInError,
    tracing::{info, warn},
};

use crate::{
    client::{map_invocation, open_client},
    config::TelegramCredentials,
    error::{Error, Result},
};

/// Source of the values a human types during login.
#[async_trait]
pub trait LoginPrompt: Send + Sync {
    async fn phone(&self) -> Result<String>;
    async fn code(&self) -> Result<String>;
    async fn password(&self, hint: Option<&str>) -> Result<String>;
}

/// Outcome of [`login`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    AlreadyAuthorized,
    SignedIn { user_id: i64 },
}

/// Authorize the session file, prompting for phone, code and 2FA password
/// as needed, and persist it.
pub async fn login(creds: &TelegramCredentials, prompt: &dyn LoginPrompt) -> Result<LoginOutcome> {
    let client = open_client(creds).await?;
    let path = creds.session_path();

    let authorized = client
        .is_authorized()
        .await
        .map_err(|e| map_invocation("check authorization", e))?;
    if authorized {
        info!(session = %path.display(), "session already authorized");
        return Ok(LoginOutcome::AlreadyAuthorized);
    }

    let phone = prompt.phone().await?;
    let token = client
        .request_login_code(phone.trim())
        .await
        .map_err(|e| Error::external("request login code", e))?;
    let code = prompt.code().await?;

    let user = match client.sign_in(&token, code.trim()).await {
        Ok(user) => user,
        Err(SignInError::PasswordRequired(password_token)) => {
            let password = prompt.password(password_token.hint()).await?;
            client
                .check_password(password_token, password.trim())
                .await
                .map_err(|e| Error::external("check 2FA password", e))?
        },
        Err(SignInError::InvalidCode) => {
            warn!("login code rejected");
            return Err(Error::message("the login code was rejected"));
        },
        Err(e) => return Err(Error::external("sign in", e)),
    };

    client.session().save_to_file(&path)?;
    info!(session = %path.display(), user_id = user.id(), "session authorized");
    Ok(LoginOutcome::SignedIn { user_id: user.id() })
}
