use crate::error::ErrorKind;

const BLOCKED_MARKERS: &[&str] = &["safety", "blocked", "candidate"];
const RATE_LIMIT_MARKERS: &[&str] = &["quota", "exhausted", "429"];
const CREDENTIAL_MARKERS: &[&str] = &["api key", "unauthorized", "403", "401", "not found"];

/// Map raw provider error text to a failure kind.
/// Case-insensitive; earlier groups win when several match.
pub fn classify_error(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    let contains_any = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

    if contains_any(BLOCKED_MARKERS) {
        ErrorKind::ContentBlocked
    } else if contains_any(RATE_LIMIT_MARKERS) {
        ErrorKind::RateLimited
    } else if contains_any(CREDENTIAL_MARKERS) {
        ErrorKind::CredentialInvalid
    } else {
        ErrorKind::TransientFailure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_exhausted_is_rate_limited() {
        assert_eq!(
            classify_error("429 Too Many Requests: Resource has been exhausted (e.g. check quota)."),
            ErrorKind::RateLimited
        );
        assert_eq!(classify_error("Resource has been exhausted"), ErrorKind::RateLimited);
    }

    #[test]
    fn test_invalid_key_is_credential_error() {
        assert_eq!(
            classify_error("400 Bad Request: API key not valid. Please pass a valid API key."),
            ErrorKind::CredentialInvalid
        );
        assert_eq!(classify_error("401 Unauthorized"), ErrorKind::CredentialInvalid);
        assert_eq!(classify_error("403 Forbidden"), ErrorKind::CredentialInvalid);
        assert_eq!(
            classify_error("Requested entity was not found."),
            ErrorKind::CredentialInvalid
        );
    }

    #[test]
    fn test_safety_block_is_content_blocked() {
        assert_eq!(
            classify_error("Request blocked by safety filters: SAFETY"),
            ErrorKind::ContentBlocked
        );
        assert_eq!(
            classify_error("Response candidate blocked (finish reason: SAFETY)"),
            ErrorKind::ContentBlocked
        );
        assert_eq!(classify_error("SAFETY"), ErrorKind::ContentBlocked);
    }

    #[test]
    fn test_everything_else_is_transient() {
        assert_eq!(
            classify_error("503 Service Unavailable: The model is overloaded."),
            ErrorKind::TransientFailure
        );
        assert_eq!(
            classify_error("error sending request: connection reset by peer"),
            ErrorKind::TransientFailure
        );
        assert_eq!(classify_error(""), ErrorKind::TransientFailure);
    }

    #[test]
    fn test_blocked_takes_precedence() {
        assert_eq!(
            classify_error("quota check skipped: content blocked"),
            ErrorKind::ContentBlocked
        );
        assert_eq!(
            classify_error("429: quota exhausted for api key"),
            ErrorKind::RateLimited
        );
    }
}
