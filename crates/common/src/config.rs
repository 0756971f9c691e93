use anyhow::Context;
use std::env;
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    /// Reads `ENVIRONMENT`; anything other than `production`/`prod` is development.
    pub fn from_env() -> Self {
        env::var("ENVIRONMENT")
            .map(|value| Self::parse_lenient(&value))
            .unwrap_or_default()
    }

    fn parse_lenient(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

/// Read and parse an environment variable.
///
/// Unset or empty variables yield `Ok(None)`. A variable that is set but does
/// not parse is an error naming the key, so a typo never silently falls back
/// to a default.
pub fn parse_env<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("Invalid value for {key}: {raw:?}")),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Unreadable value for {key}")),
    }
}

/// Like [`parse_env`] but falls back to `default` when the variable is unset.
pub fn parse_env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    Ok(parse_env(key)?.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_environment_parsing() {
        assert_eq!(Environment::parse_lenient("prod"), Environment::Production);
        assert_eq!(
            Environment::parse_lenient(" Production "),
            Environment::Production
        );
        assert_eq!(
            Environment::parse_lenient("staging"),
            Environment::Development
        );
        assert_eq!(Environment::Production.as_str(), "production");
    }

    #[test]
    #[serial]
    fn test_environment_from_env() {
        unsafe { env::set_var("ENVIRONMENT", "prod") };
        assert_eq!(Environment::from_env(), Environment::Production);

        unsafe { env::remove_var("ENVIRONMENT") };
        assert_eq!(Environment::from_env(), Environment::Development);
    }

    #[test]
    #[serial]
    fn test_parse_env_unset_and_empty() {
        unsafe { env::remove_var("COMMON_TEST_VALUE") };
        assert_eq!(parse_env::<u32>("COMMON_TEST_VALUE").unwrap(), None);
        assert_eq!(parse_env_or("COMMON_TEST_VALUE", 7u32).unwrap(), 7);

        unsafe { env::set_var("COMMON_TEST_VALUE", "  ") };
        assert_eq!(parse_env::<u32>("COMMON_TEST_VALUE").unwrap(), None);

        unsafe { env::remove_var("COMMON_TEST_VALUE") };
    }

    #[test]
    #[serial]
    fn test_parse_env_rejects_malformed_value() {
        unsafe { env::set_var("COMMON_TEST_VALUE", "not-a-number") };

        let err = parse_env::<f32>("COMMON_TEST_VALUE").unwrap_err();
        assert!(
            err.to_string().contains("COMMON_TEST_VALUE"),
            "Error should name the offending key: {err}"
        );

        unsafe { env::set_var("COMMON_TEST_VALUE", "0.25") };
        assert_eq!(parse_env::<f32>("COMMON_TEST_VALUE").unwrap(), Some(0.25));

        unsafe { env::remove_var("COMMON_TEST_VALUE") };
    }
}
