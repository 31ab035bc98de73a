//! Environment variable helpers

use std::env;
use std::str::FromStr;

use crate::error::{CliError, Result};

/// Environment variable overriding `database.path`
pub const ENV_DATABASE: &str = "AGENTGRAPH_DATABASE";
/// Environment variable overriding `logging.level`
pub const ENV_LOG_LEVEL: &str = "AGENTGRAPH_LOG_LEVEL";
/// Environment variable overriding `history.limit`
pub const ENV_HISTORY_LIMIT: &str = "AGENTGRAPH_HISTORY_LIMIT";

/// Read a variable; unset and empty both yield `None`
pub fn get_env(key: &str) -> Result<Option<String>> {
    match env::var(key) {
        Ok(val) if val.trim().is_empty() => Ok(None),
        Ok(val) => Ok(Some(val)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(CliError::Env {
            key: key.to_string(),
            message: "contains invalid UTF-8".to_string(),
        }),
    }
}

/// Read and parse a variable
pub fn get_env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get_env(key)? {
        Some(val) => val.trim().parse::<T>().map(Some).map_err(|e| CliError::Env {
            key: key.to_string(),
            message: format!("failed to parse '{}': {}", val, e),
        }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_and_empty() {
        env::remove_var("AGENTGRAPH_TEST_MISSING");
        assert_eq!(get_env("AGENTGRAPH_TEST_MISSING").unwrap(), None);

        env::set_var("AGENTGRAPH_TEST_EMPTY", "  ");
        assert_eq!(get_env("AGENTGRAPH_TEST_EMPTY").unwrap(), None);
        env::remove_var("AGENTGRAPH_TEST_EMPTY");
    }

    #[test]
    fn test_parse() {
        env::set_var("AGENTGRAPH_TEST_NUMBER", " 42 ");
        assert_eq!(get_env_parse::<usize>("AGENTGRAPH_TEST_NUMBER").unwrap(), Some(42));

        env::set_var("AGENTGRAPH_TEST_NUMBER", "many");
        let err = get_env_parse::<usize>("AGENTGRAPH_TEST_NUMBER").unwrap_err();
        assert!(err.to_string().contains("AGENTGRAPH_TEST_NUMBER"));
        env::remove_var("AGENTGRAPH_TEST_NUMBER");
    }
}
