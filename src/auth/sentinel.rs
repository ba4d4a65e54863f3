//! Provider failure classification
//!
//! The auth service signals structured conditions through sentinel prefixes
//! in error messages. Most map to typed auth errors; one is special: a
//! restore can fail to load the profile while the session itself is valid,
//! and the caller should proceed with a degraded identity instead of
//! logging the user out.

use tracing::debug;

use crate::auth::provider::ProviderError;
use crate::error::AppError;

/// Restore succeeded at the session level but the profile fetch failed.
/// Payload: `user_id` or `user_id:email`.
pub const VALID_SESSION_NO_USER: &str = "VALID_SESSION_NO_USER:";

/// How a failed session restore should be handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreDisposition {
    /// Proceed with the identity from the sentinel payload; the profile can
    /// be completed later.
    Degraded {
        user_id: String,
        email: Option<String>,
    },
    /// The session is genuinely unusable.
    Fatal(AppError),
}

/// Classify a restore failure, honoring the degraded-session sentinel.
pub fn classify_restore_error(error: &ProviderError) -> RestoreDisposition {
    if let Some(payload) = error.message.strip_prefix(VALID_SESSION_NO_USER) {
        let mut parts = payload.splitn(2, ':');
        let user_id = parts.next().unwrap_or("").trim().to_string();
        let email = parts
            .next()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());

        if user_id.is_empty() {
            debug!("Degraded-session sentinel without a user id, treating as fatal");
            return RestoreDisposition::Fatal(
                AppError::not_authenticated("Degraded session carries no user id")
                    .with_user_message("Please sign in again."),
            );
        }
        return RestoreDisposition::Degraded { user_id, email };
    }
    RestoreDisposition::Fatal(classify_provider_error(error))
}

/// Map a provider failure message to a typed error.
pub fn classify_provider_error(error: &ProviderError) -> AppError {
    if let Some(classified) = AppError::classify_message(&error.message) {
        return classified;
    }
    let lower = error.message.to_lowercase();
    if lower.contains("invalid") && lower.contains("credentials") {
        return AppError::invalid_credentials(&error.message)
            .with_user_message("Incorrect email or password.");
    }
    AppError::unknown(&error.message).with_user_message("Something went wrong. Please try again.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degraded_with_email() {
        let disposition = classify_restore_error(&ProviderError::new(
            "VALID_SESSION_NO_USER:user-1:alice@vinoteca.app",
        ));
        assert_eq!(
            disposition,
            RestoreDisposition::Degraded {
                user_id: "user-1".to_string(),
                email: Some("alice@vinoteca.app".to_string()),
            }
        );
    }

    #[test]
    fn test_degraded_without_email() {
        let disposition =
            classify_restore_error(&ProviderError::new("VALID_SESSION_NO_USER:user-1"));
        assert_eq!(
            disposition,
            RestoreDisposition::Degraded {
                user_id: "user-1".to_string(),
                email: None,
            }
        );
    }

    #[test]
    fn test_degraded_without_user_id_is_fatal() {
        let disposition = classify_restore_error(&ProviderError::new("VALID_SESSION_NO_USER:"));
        match disposition {
            RestoreDisposition::Fatal(e) => assert_eq!(e.code(), "AUTH_001"),
            other => panic!("expected fatal, got {other:?}"),
        }
    }

    #[test]
    fn test_fatal_sentinels_map_to_distinct_codes() {
        let cases = [
            ("FLAGGED_ACCOUNT:abuse", "AUTH_004"),
            ("SESSION_INVALIDATED:superseded", "AUTH_003"),
            ("SESSION_EXPIRED:ttl", "AUTH_002"),
            ("SESSION_TERMINATED:admin", "AUTH_003"),
            ("INVALID_SESSION:garbled token", "AUTH_007"),
        ];
        for (message, code) in cases {
            match classify_restore_error(&ProviderError::new(message)) {
                RestoreDisposition::Fatal(e) => assert_eq!(e.code(), code, "for {message}"),
                other => panic!("expected fatal for {message}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_invalid_credentials() {
        let e = classify_provider_error(&ProviderError::new("Invalid login credentials"));
        assert_eq!(e.code(), "AUTH_006");
        assert_eq!(e.user_message(), "Incorrect email or password.");
    }

    #[test]
    fn test_unmatched_message_is_unknown() {
        let e = classify_provider_error(&ProviderError::new("service melted"));
        assert_eq!(e.code(), "UNK_001");
    }
}
