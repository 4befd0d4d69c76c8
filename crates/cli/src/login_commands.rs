//! `registra login`: interactive authorization of the user session.

use registra_config::RegistraConfig;

#[cfg(feature = "mtproto")]
use {
    async_trait::async_trait,
    registra_telegram::{LoginOutcome, LoginPrompt},
};

/// Reads login answers from the terminal.
#[cfg(feature = "mtproto")]
struct StdinPrompt;

#[cfg(feature = "mtproto")]
impl StdinPrompt {
    async fn ask(question: String) -> registra_telegram::Result<String> {
        let answer = tokio::task::spawn_blocking(move || {
            use std::io::Write;

            eprint!("{question}");
            std::io::stderr().flush()?;
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            Ok::<_, std::io::Error>(line.trim().to_string())
        })
        .await
        .map_err(|e| registra_telegram::Error::external("prompt task", e))??;

        if answer.is_empty() {
            return Err(registra_telegram::Error::message("no input given"));
        }
        Ok(answer)
    }
}

#[cfg(feature = "mtproto")]
#[async_trait]
impl LoginPrompt for StdinPrompt {
    async fn phone(&self) -> registra_telegram::Result<String> {
        Self::ask("Phone number (international format): ".into()).await
    }

    async fn code(&self) -> registra_telegram::Result<String> {
        Self::ask("Login code: ".into()).await
    }

    async fn password(&self, hint: Option<&str>) -> registra_telegram::Result<String> {
        let question = match hint {
            Some(hint) => format!("2FA password (hint: {hint}): "),
            None => "2FA password: ".into(),
        };
        Self::ask(question).await
    }
}

#[cfg(feature = "mtproto")]
pub async fn handle_login(config: &RegistraConfig) -> anyhow::Result<()> {
    let creds = crate::transport::credentials(config);
    if !creds.is_complete() {
        anyhow::bail!("TELEGRAM_API_ID, TELEGRAM_API_HASH and TELEGRAM_SESSION must be set");
    }

    match registra_telegram::login(&creds, &StdinPrompt).await? {
        LoginOutcome::AlreadyAuthorized => {
            println!("Already logged in ({}).", creds.session_path().display());
        },
        LoginOutcome::SignedIn { user_id } => {
            println!(
                "Logged in as user {user_id}; session saved to {}.",
                creds.session_path().display()
            );
        },
    }
    Ok(())
}

#[cfg(not(feature = "mtproto"))]
pub async fn handle_login(_config: &RegistraConfig) -> anyhow::Result<()> {
    anyhow::bail!("registra was built without a transport; rebuild with `--features mtproto`")
}
