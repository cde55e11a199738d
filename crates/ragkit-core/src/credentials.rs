//! API key lookup backed by the nearest `.env` file.
//!
//! Keys that are missing come back as `None`; validating them is up to the
//! caller (see [`require_api_key`]).

use anyhow::anyhow;
use tracing::debug;

pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const HUGGINGFACE_API_KEY: &str = "HUGGINGFACE_API_KEY";

/// Load the nearest `.env` (current directory, then parents) and read `name`.
///
/// Variables already present in the process environment take precedence over
/// the file.
pub fn get_api_key(name: &str) -> Option<String> {
    match dotenvy::dotenv() {
        Ok(path) => debug!(path = %path.display(), "loaded env file"),
        Err(e) => debug!(error = %e, "no env file loaded"),
    }
    std::env::var(name).ok()
}

pub fn get_openai_api_key() -> Option<String> {
    get_api_key(OPENAI_API_KEY)
}

pub fn get_hf_api_key() -> Option<String> {
    get_api_key(HUGGINGFACE_API_KEY)
}

/// Like [`get_api_key`] but rejects absent or blank values.
pub fn require_api_key(name: &str) -> anyhow::Result<String> {
    match get_api_key(name) {
        Some(v) if !v.trim().is_empty() => Ok(v),
        Some(_) => Err(anyhow!("{} is set but empty", name)),
        None => Err(anyhow!("{} is not set (environment or .env)", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_none_not_error() {
        assert_eq!(get_api_key("RAGKIT_TEST_DEFINITELY_UNSET_KEY"), None);
        assert!(require_api_key("RAGKIT_TEST_DEFINITELY_UNSET_KEY").is_err());
    }

    #[test]
    fn present_key_is_returned() {
        std::env::set_var("RAGKIT_TEST_PRESENT_KEY", "sk-test");
        assert_eq!(get_api_key("RAGKIT_TEST_PRESENT_KEY").as_deref(), Some("sk-test"));
        assert_eq!(require_api_key("RAGKIT_TEST_PRESENT_KEY").unwrap(), "sk-test");
    }

    #[test]
    fn blank_key_is_returned_but_fails_validation() {
        std::env::set_var("RAGKIT_TEST_BLANK_KEY", "  ");
        assert_eq!(get_api_key("RAGKIT_TEST_BLANK_KEY").as_deref(), Some("  "));
        assert!(require_api_key("RAGKIT_TEST_BLANK_KEY").is_err());
    }
}
