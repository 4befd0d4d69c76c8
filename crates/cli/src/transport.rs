//! Chooses the chat transport the relay runs on.

use std::sync::Arc;

use {registra_config::RegistraConfig, registra_relay::Connector, registra_telegram::TelegramCredentials};

/// Session credentials from the loaded config.
#[cfg_attr(not(feature = "mtproto"), allow(dead_code))]
pub fn credentials(config: &RegistraConfig) -> TelegramCredentials {
    let tg = &config.telegram;
    TelegramCredentials {
        api_id: tg.api_id,
        api_hash: tg.api_hash.clone(),
        session_name: tg.session_name.clone(),
        session_dir: tg.session_dir.clone(),
    }
}

#[cfg(feature = "mtproto")]
pub fn connector(config: &RegistraConfig) -> anyhow::Result<Arc<dyn Connector>> {
    let creds = credentials(config);
    if !creds.is_complete() {
        anyhow::bail!(
            "telegram credentials are incomplete; set TELEGRAM_API_ID, TELEGRAM_API_HASH and \
             TELEGRAM_SESSION or run `registra doctor`"
        );
    }
    Ok(Arc::new(registra_telegram::MtprotoConnector::new(creds)))
}

#[cfg(not(feature = "mtproto"))]
pub fn connector(_config: &RegistraConfig) -> anyhow::Result<Arc<dyn Connector>> {
    anyhow::bail!("registra was built without a transport; rebuild with `--features mtproto`")
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::Secret};

    #[test]
    fn credentials_copy_telegram_section() {
        let mut config = RegistraConfig::default();
        config.telegram.api_id = 42;
        config.telegram.api_hash = Secret::new("abc".into());
        config.telegram.session_name = "Consultas".into();

        let creds = credentials(&config);
        assert_eq!(creds.api_id, 42);
        assert_eq!(creds.api_hash(), "abc");
        assert!(creds.session_path().ends_with("sessions/Consultas.session"));
        assert!(creds.is_complete());
    }

    #[cfg(feature = "mtproto")]
    #[test]
    fn default_build_ships_a_transport() {
        let mut config = RegistraConfig::default();
        config.telegram.api_id = 42;
        config.telegram.api_hash = Secret::new("abc".into());
        assert!(connector(&config).is_ok());
    }

    #[test]
    fn incomplete_credentials_are_rejected() {
        assert!(connector(&RegistraConfig::default()).is_err());
    }
}
