//! Environment variable interpolation for config files.
//!
//! Credentials are kept out of config files by referencing the environment:
//! - `$VAR` or `${VAR}` - substitute with env var value, error if missing
//! - `${VAR:-default}` - use default if VAR is unset OR empty
//! - `${VAR-default}` - use default only if VAR is unset (empty is OK)
//! - `$$` - escape sequence for literal `$`
//!
//! The environment is only read, never modified.

use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

use crate::error::ConfigError;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        (?P<escape>\$\$)
        |
        \$\{
            (?P<braced>[A-Za-z_][A-Za-z0-9_]*)
            (?: (?P<op>:?-) (?P<default>[^}]*) )?
        \}
        |
        \$(?P<bare>[A-Za-z_][A-Za-z0-9_]*)
        ",
    )
    .expect("interpolation pattern must compile")
});

/// How a missing or empty variable falls back to its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fallback<'a> {
    /// No default: the variable must be set.
    Required,
    /// `${VAR-default}`: only an unset variable falls back.
    IfUnset(&'a str),
    /// `${VAR:-default}`: an unset or empty variable falls back.
    IfUnsetOrEmpty(&'a str),
}

fn resolve(name: &str, fallback: Fallback<'_>) -> Result<String, String> {
    match (env::var(name), fallback) {
        (Ok(value), _) if value.contains('\n') || value.contains('\r') => Err(format!(
            "environment variable '{name}' contains newlines, which is not allowed"
        )),
        (Ok(value), Fallback::IfUnsetOrEmpty(default)) if value.is_empty() => {
            Ok(default.to_string())
        }
        (Ok(value), _) => Ok(value),
        (Err(_), Fallback::IfUnset(default) | Fallback::IfUnsetOrEmpty(default)) => {
            Ok(default.to_string())
        }
        (Err(_), Fallback::Required) => Err(format!("environment variable '{name}' is not set")),
    }
}

fn fallback_of<'a>(caps: &Captures<'a>) -> Fallback<'a> {
    let default = caps.name("default").map_or("", |m| m.as_str());
    match caps.name("op").map(|m| m.as_str()) {
        Some(":-") => Fallback::IfUnsetOrEmpty(default),
        Some(_) => Fallback::IfUnset(default),
        None => Fallback::Required,
    }
}

/// Interpolate environment variables in the given text.
///
/// Every unresolved reference is reported, so a config with several missing
/// variables fails once with the full list.
pub fn interpolate(input: &str) -> Result<String, ConfigError> {
    let mut errors = Vec::new();

    let text = ENV_VAR_PATTERN.replace_all(input, |caps: &Captures| {
        if caps.name("escape").is_some() {
            return "$".to_string();
        }

        let (name, fallback) = match (caps.name("braced"), caps.name("bare")) {
            (Some(name), _) => (name.as_str(), fallback_of(caps)),
            (None, Some(name)) => (name.as_str(), Fallback::Required),
            (None, None) => return caps[0].to_string(),
        };

        resolve(name, fallback).unwrap_or_else(|message| {
            errors.push(message);
            caps[0].to_string()
        })
    });

    if errors.is_empty() {
        Ok(text.into_owned())
    } else {
        Err(ConfigError::EnvInterpolation { errors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_env_vars<F, R>(vars: &[(&str, Option<&str>)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let originals: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();

        // SAFETY: each test uses its own variable names, so concurrent tests
        // never observe each other's values.
        for (key, value) in vars {
            match value {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        let result = f();

        // SAFETY: restoring the values captured above
        for (key, original) in originals {
            match original {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        result
    }

    #[test]
    fn test_bare_and_braced_substitution() {
        with_env_vars(
            &[
                ("STARLING_TEST_KEY_ID", Some("AKIA123")),
                ("STARLING_TEST_SECRET", Some("s3cr3t")),
            ],
            || {
                let text = interpolate(
                    "aws_access_key_id: $STARLING_TEST_KEY_ID\naws_secret_access_key: ${STARLING_TEST_SECRET}",
                )
                .unwrap();
                assert_eq!(
                    text,
                    "aws_access_key_id: AKIA123\naws_secret_access_key: s3cr3t"
                );
            },
        );
    }

    #[test]
    fn test_all_missing_variables_reported() {
        with_env_vars(
            &[
                ("STARLING_TEST_MISSING_A", None),
                ("STARLING_TEST_MISSING_B", None),
            ],
            || {
                let err = interpolate("a: $STARLING_TEST_MISSING_A\nb: ${STARLING_TEST_MISSING_B}")
                    .unwrap_err();
                match err {
                    ConfigError::EnvInterpolation { errors } => {
                        assert_eq!(errors.len(), 2);
                        assert!(errors[0].contains("STARLING_TEST_MISSING_A"));
                        assert!(errors[1].contains("not set"));
                    }
                    other => panic!("Expected EnvInterpolation, got {other:?}"),
                }
            },
        );
    }

    #[test]
    fn test_defaults_for_unset_and_empty() {
        with_env_vars(
            &[
                ("STARLING_TEST_UNSET", None),
                ("STARLING_TEST_EMPTY", Some("")),
            ],
            || {
                assert_eq!(
                    interpolate("${STARLING_TEST_UNSET:-us-west-2}").unwrap(),
                    "us-west-2"
                );
                assert_eq!(
                    interpolate("${STARLING_TEST_UNSET-us-west-2}").unwrap(),
                    "us-west-2"
                );
                assert_eq!(
                    interpolate("${STARLING_TEST_EMPTY:-fallback}").unwrap(),
                    "fallback"
                );
                assert_eq!(interpolate("[${STARLING_TEST_EMPTY-fallback}]").unwrap(), "[]");
            },
        );
    }

    #[test]
    fn test_newline_injection_rejected() {
        with_env_vars(&[("STARLING_TEST_NEWLINE", Some("a\nb: c"))], || {
            assert!(interpolate("key: $STARLING_TEST_NEWLINE").is_err());
        });
    }

    #[test]
    fn test_escape_sequence() {
        assert_eq!(interpolate("price: $$100").unwrap(), "price: $100");
    }
}
