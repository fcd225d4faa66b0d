//! Environment variable interpolation for config files.
//!
//! - `$VAR` / `${VAR}`: the variable's value, an error when unset
//! - `${VAR:-default}`: `default` when unset or empty
//! - `${VAR-default}`: `default` only when unset
//! - `$$`: a literal `$`

use regex::{Captures, Regex};
use snafu::ensure;
use std::sync::LazyLock;

use crate::error::{ConfigError, EnvInterpolationSnafu};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$
        | \$\{ (?P<braced>[A-Za-z_][A-Za-z0-9_]*) (?: (?P<op>:?-) (?P<default>[^}]*) )? \}
        | \$ (?P<bare>[A-Za-z_][A-Za-z0-9_]*)
        ",
    )
    .unwrap()
});

/// Interpolate process environment variables into `input`.
pub fn interpolate(input: &str) -> Result<String, ConfigError> {
    interpolate_with(input, |name| std::env::var(name).ok())
}

/// Interpolate using an arbitrary variable lookup.
///
/// Every unresolved placeholder is reported in a single error.
pub fn interpolate_with<F>(input: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut problems = Vec::new();

    let output = PLACEHOLDER.replace_all(input, |caps: &Captures| {
        let Some(name) = caps.name("braced").or_else(|| caps.name("bare")) else {
            return "$".to_string();
        };
        let name = name.as_str();
        let fallback = caps.name("default").map(|m| m.as_str());
        let empty_uses_default = caps.name("op").is_some_and(|op| op.as_str() == ":-");

        match lookup(name) {
            Some(value) if value.contains(['\n', '\r']) => {
                problems.push(format!("'{name}' contains a newline"));
                String::new()
            }
            Some(value) if value.is_empty() && empty_uses_default => {
                fallback.unwrap_or_default().to_string()
            }
            Some(value) => value,
            None => match fallback {
                Some(default) => default.to_string(),
                None => {
                    problems.push(format!("'{name}' is not set"));
                    String::new()
                }
            },
        }
    });

    ensure!(
        problems.is_empty(),
        EnvInterpolationSnafu {
            message: problems
                .iter()
                .map(|p| format!("  - {p}"))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    );

    Ok(output.into_owned())
}
