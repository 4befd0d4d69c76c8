//! Mapping of Telegram RPC errors onto [`TransportError`].

use std::time::Duration;

use registra_relay::TransportError;

/// RPC error names that mean the stored auth key is no longer usable.
const CORRUPTED_SESSION_ERRORS: &[&str] = &[
    "AUTH_KEY_UNREGISTERED",
    "AUTH_KEY_INVALID",
    "AUTH_KEY_DUPLICATED",
    "SESSION_REVOKED",
    "SESSION_EXPIRED",
    "USER_DEACTIVATED",
];

/// RPC error names (without the `_X` value suffix) that carry a wait in seconds.
const WAIT_ERRORS: &[&str] = &["FLOOD_WAIT", "FLOOD_PREMIUM_WAIT", "SLOWMODE_WAIT"];

/// Classify an RPC error by its code, name and optional numeric value.
///
/// Names may arrive either split (`FLOOD_WAIT` + `Some(10)`) or with the
/// value still embedded (`FLOOD_WAIT_10`).
#[must_use]
pub fn classify_rpc(code: i32, name: &str, value: Option<u32>) -> TransportError {
    if let Some(wait) = wait_of(name, value) {
        return TransportError::rate_limited(wait);
    }
    if CORRUPTED_SESSION_ERRORS.contains(&name) {
        return TransportError::corrupted(name);
    }
    if code == 401 {
        return TransportError::unauthorized(name);
    }
    let message = match value {
        Some(value) => format!("{name} ({value})"),
        None => name.to_string(),
    };
    TransportError::protocol(code, message)
}

fn wait_of(name: &str, value: Option<u32>) -> Option<Duration> {
    if WAIT_ERRORS.contains(&name) {
        return Some(Duration::from_secs(u64::from(value.unwrap_or(0))));
    }
    WAIT_ERRORS.iter().find_map(|prefix| {
        name.strip_prefix(prefix)?
            .strip_prefix('_')?
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case(420, "FLOOD_WAIT", Some(10), 10)]
    #[case(420, "FLOOD_WAIT_31", None, 31)]
    #[case(420, "SLOWMODE_WAIT", Some(5), 5)]
    #[case(420, "FLOOD_PREMIUM_WAIT", Some(2), 2)]
    fn rate_limits(
        #[case] code: i32,
        #[case] name: &str,
        #[case] value: Option<u32>,
        #[case] secs: u64,
    ) {
        match classify_rpc(code, name, value) {
            TransportError::RateLimited { wait } => assert_eq!(wait, Duration::from_secs(secs)),
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[rstest]
    #[case("AUTH_KEY_UNREGISTERED")]
    #[case("AUTH_KEY_INVALID")]
    #[case("SESSION_REVOKED")]
    fn corrupted_sessions(#[case] name: &str) {
        assert!(matches!(
            classify_rpc(401, name, None),
            TransportError::CorruptedCredentials { .. }
        ));
    }

    #[test]
    fn other_unauthorized_errors() {
        assert!(matches!(
            classify_rpc(401, "SESSION_PASSWORD_NEEDED", None),
            TransportError::Unauthorized { .. }
        ));
    }

    #[rstest]
    #[case(400, "USERNAME_NOT_OCCUPIED", None, "USERNAME_NOT_OCCUPIED")]
    #[case(400, "PEER_ID_INVALID", None, "PEER_ID_INVALID")]
    #[case(500, "RPC_CALL_FAIL", Some(3), "RPC_CALL_FAIL (3)")]
    fn protocol_errors(
        #[case] code: i32,
        #[case] name: &str,
        #[case] value: Option<u32>,
        #[case] display: &str,
    ) {
        let err = classify_rpc(code, name, value);
        assert!(matches!(err, TransportError::Protocol { .. }));
        assert_eq!(err.to_string(), display);
    }

    #[test]
    fn malformed_wait_suffix_is_protocol_error() {
        assert!(matches!(
            classify_rpc(420, "FLOOD_WAIT_soon", None),
            TransportError::Protocol { .. }
        ));
    }
}
