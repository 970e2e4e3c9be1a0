//! Environment and credential resolution.
//!
//! Mirrors `original_source/scripts/setup.py`'s provider -> env-var mapping
//! and `original_source/server/main.py`'s credential fallback order:
//! explicit argument, then the provider's environment variable, then fail.

use crate::error::{Result, RlmError};
use crate::types::Backend;

/// Load a `.env` file from the current directory, if present. Binaries call
/// this once at startup; the library itself never touches the environment
/// implicitly.
pub fn load_dotenv() {
    if let Err(err) = dotenvy::dotenv() {
        if !matches!(err, dotenvy::Error::Io(ref e) if e.kind() == std::io::ErrorKind::NotFound) {
            tracing::warn!(%err, "failed to load .env file");
        }
    }
}

/// Resolve an API key for `backend`: explicit argument wins, otherwise the
/// provider's environment variable, otherwise a `MissingApiKey` error.
pub fn resolve_api_key(backend: Backend, explicit: Option<&str>) -> Result<String> {
    if let Some(key) = explicit {
        return Ok(key.to_string());
    }
    std::env::var(backend.env_var()).map_err(|_| RlmError::MissingApiKey(backend.env_var()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_key_wins_over_env() {
        std::env::set_var("OPENAI_API_KEY", "from-env");
        let key = resolve_api_key(Backend::OpenAi, Some("from-arg")).unwrap();
        assert_eq!(key, "from-arg");
        std::env::remove_var("OPENAI_API_KEY");
    }

    #[test]
    fn falls_back_to_env_var() {
        std::env::set_var("CEREBRAS_API_KEY", "env-key");
        let key = resolve_api_key(Backend::Cerebras, None).unwrap();
        assert_eq!(key, "env-key");
        std::env::remove_var("CEREBRAS_API_KEY");
    }

    #[test]
    fn missing_key_is_an_error() {
        std::env::remove_var("GOOGLE_API_KEY");
        let err = resolve_api_key(Backend::Gemini, None).unwrap_err();
        assert!(matches!(err, RlmError::MissingApiKey("GOOGLE_API_KEY")));
    }
}
