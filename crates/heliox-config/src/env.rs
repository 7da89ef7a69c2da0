use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Matches `{{ env.VAR }}` and `{{ env.VAR | default("fallback") }}`
fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\{\{\s*([a-zA-Z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#)
            .unwrap_or_else(|e| unreachable!("placeholder pattern is valid: {e}"))
    })
}

/// Expand `{{ env.VAR }}` placeholders in raw TOML text
///
/// `{{ env.VAR | default("x") }}` substitutes `x` when the variable is unset.
/// Comment lines are passed through untouched so commented-out secrets do
/// not have to exist.
pub fn expand_env(input: &str) -> Result<String, String> {
    let mut lines = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_string());
        } else {
            lines.push(expand_line(line)?);
        }
    }

    let mut output = lines.join("\n");
    if input.ends_with('\n') {
        output.push('\n');
    }

    Ok(output)
}

fn expand_line(line: &str) -> Result<String, String> {
    let mut failure = None;

    let expanded = placeholder().replace_all(line, |caps: &Captures<'_>| {
        match resolve(&caps[1], caps.get(2).map(|m| m.as_str())) {
            Ok(value) => value,
            Err(e) => {
                failure.get_or_insert(e);
                String::new()
            }
        }
    });

    match failure {
        Some(e) => Err(e),
        None => Ok(expanded.into_owned()),
    }
}

fn resolve(key: &str, default: Option<&str>) -> Result<String, String> {
    let Some(var_name) = key.strip_prefix("env.").filter(|name| !name.contains('.')) else {
        return Err(format!("only variables scoped with 'env.' are supported: `{key}`"));
    };

    match (std::env::var(var_name), default) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.to_string()),
        (Err(_), None) => Err(format!("environment variable not found: `{var_name}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_placeholders() {
        let input = "listen_address = \"0.0.0.0:8080\"";
        assert_eq!(expand_env(input).unwrap(), input);
    }

    #[test]
    fn expands_several_vars() {
        let vars = [("HLX_REDIS", Some("redis://cache:6379")), ("HLX_KEY", Some("hlx_abc"))];
        temp_env::with_vars(vars, || {
            let result = expand_env("url = \"{{ env.HLX_REDIS }}\"\nsecret = \"{{env.HLX_KEY}}\"\n").unwrap();
            assert_eq!(result, "url = \"redis://cache:6379\"\nsecret = \"hlx_abc\"\n");
        });
    }

    #[test]
    fn missing_var_is_an_error() {
        temp_env::with_var_unset("HLX_MISSING", || {
            let err = expand_env("secret = \"{{ env.HLX_MISSING }}\"").unwrap_err();
            assert!(err.contains("HLX_MISSING"));
        });
    }

    #[test]
    fn unsupported_scope() {
        let err = expand_env("key = \"{{ vault.TOKEN }}\"").unwrap_err();
        assert!(err.contains("only variables scoped with 'env.'"));
    }

    #[test]
    fn comments_are_not_expanded() {
        temp_env::with_var_unset("HLX_MISSING", || {
            let input = "  # secret = \"{{ env.HLX_MISSING }}\"";
            assert_eq!(expand_env(input).unwrap(), input);
        });
    }

    #[test]
    fn default_applies_only_when_unset() {
        temp_env::with_var_unset("HLX_LEVEL", || {
            let result = expand_env("level = \"{{ env.HLX_LEVEL | default(\"debug\") }}\"").unwrap();
            assert_eq!(result, "level = \"debug\"");
        });
        temp_env::with_var("HLX_LEVEL", Some("warn"), || {
            let result = expand_env("level = \"{{ env.HLX_LEVEL | default(\"debug\") }}\"").unwrap();
            assert_eq!(result, "level = \"warn\"");
        });
    }

    #[test]
    fn empty_default() {
        temp_env::with_var_unset("HLX_OPTIONAL", || {
            let result = expand_env("v = \"{{ env.HLX_OPTIONAL | default(\"\") }}\"").unwrap();
            assert_eq!(result, "v = \"\"");
        });
    }
}
