//! # Configuration
//!
//! Process configuration read once from environment variables at startup.
//!
//! - `controller`: leader election, sweep, shutdown and logging settings
//! - `server`: probe, metrics and admission webhook listeners

pub mod controller;
pub mod server;

pub use controller::ControllerConfig;
pub use server::ServerConfig;

/// Read environment variable or return default value
pub(crate) fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
pub(crate) fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map_or(default, |v| parse_env_bool(&v, default))
}

/// Read environment variable as string or return default
pub(crate) fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read the first non-empty environment variable out of `keys`
pub(crate) fn first_env_var(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

fn parse_env_bool(value: &str, default: bool) -> bool {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_bool() {
        assert!(parse_env_bool("true", false));
        assert!(parse_env_bool(" ON ", false));
        assert!(parse_env_bool("1", false));
        assert!(!parse_env_bool("off", true));
        assert!(!parse_env_bool("No", true));
        assert!(parse_env_bool("maybe", true), "Unknown values keep the default");
        assert!(!parse_env_bool("", false));
    }

    #[test]
    fn test_env_var_or_default_missing_key() {
        let value: u64 = env_var_or_default("RANDOM_SECRET_TEST_SURELY_UNSET_VAR", 42);
        assert_eq!(value, 42);
        assert_eq!(
            env_var_or_default_str("RANDOM_SECRET_TEST_SURELY_UNSET_VAR", "fallback"),
            "fallback"
        );
        assert_eq!(first_env_var(&["RANDOM_SECRET_TEST_SURELY_UNSET_VAR"]), None);
    }
}
