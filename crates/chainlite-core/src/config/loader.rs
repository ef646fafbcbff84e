//! Environment loading helpers.
//!
//! Fallback chains (primary key, then aliases) are kept here so business code never
//! repeats `or_else` lookups.

use std::env;

/// Deprecated variable → recommended variable.
const DEPRECATED_PAIRS: &[(&str, &str)] = &[
    ("CHAINLITE_DATA_ROOT", "CHAINLITE_DATA_DIR"),
    ("CHAINLITE_RAG_TOP_K", "CHAINLITE_TOP_K"),
];

fn warn_deprecated_env_vars() {
    use std::sync::Once;
    static WARNED: Once = Once::new();
    WARNED.call_once(|| {
        let mut hints = Vec::new();
        for (deprecated, recommended) in DEPRECATED_PAIRS {
            if env::var(deprecated).is_ok() && env::var(recommended).is_err() {
                hints.push(format!("{} → {}", deprecated, recommended));
            }
        }
        if !hints.is_empty() {
            tracing::warn!(
                "[DEPRECATED] the following environment variables are deprecated:\n   {}",
                hints.join("\n   ")
            );
        }
    });
}

/// Load `.env` from the current directory into the process environment.
/// Existing variables are never overridden. Runs at most once.
pub fn load_dotenv() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let path = env::current_dir()
            .map(|d| d.join(".env"))
            .unwrap_or_else(|_| std::path::PathBuf::from(".env"));
        if let Ok(content) = std::fs::read_to_string(&path) {
            for (key, value) in parse_dotenv(&content) {
                if env::var(&key).is_err() {
                    set_env_var(&key, &value);
                }
            }
        }
        warn_deprecated_env_vars();
    });
}

/// Parse `.env` content into key/value pairs. Quotes are stripped and inline
/// comments outside quotes are dropped.
pub fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(eq_pos) = line.find('=') else {
            continue;
        };
        let key = line[..eq_pos].trim();
        let mut value = line[eq_pos + 1..].trim();
        if let Some(hash_pos) = value.find('#') {
            let before_hash = value[..hash_pos].trim_end();
            if !before_hash.contains('"') && !before_hash.contains('\'') {
                value = before_hash;
            }
        }
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            value = &value[1..value.len() - 1];
        }
        if !key.is_empty() {
            pairs.push((key.to_string(), value.to_string()));
        }
    }
    pairs
}

/// Read the primary key or the first set alias; empty values fall back to `default`.
pub fn env_or<F>(primary: &str, aliases: &[&str], default: F) -> String
where
    F: FnOnce() -> String,
{
    env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(default)
}

/// Like [`env_or`] but returns `None` when unset or blank.
pub fn env_optional(primary: &str, aliases: &[&str]) -> Option<String> {
    env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()))
        .and_then(|s| {
            let s = s.trim().to_string();
            if s.is_empty() {
                None
            } else {
                Some(s)
            }
        })
}

/// Boolean variable: `0/false/no/off` are false, anything else set is true.
pub fn env_bool(primary: &str, aliases: &[&str], default: bool) -> bool {
    let v = env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()));
    match v.as_deref() {
        Some(s) => !matches!(
            s.trim().to_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        ),
        None => default,
    }
}

/// Numeric variable with fallback on absence or parse failure.
pub fn env_usize(primary: &str, aliases: &[&str], default: usize) -> usize {
    env_optional(primary, aliases)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ─── Centralised env::set_var ───────────────────────────────────────────────
//
// Callers must invoke these before the tokio runtime spawns worker threads.

#[allow(unsafe_code)]
pub fn set_env_var(key: &str, value: &str) {
    unsafe { env::set_var(key, value) };
}

#[allow(unsafe_code)]
pub fn remove_env_var(key: &str) {
    unsafe { env::remove_var(key) };
}

/// Initialise LLM variables from CLI flags. Call before the runtime starts.
pub fn init_llm_env(api_base: Option<&str>, api_key: Option<&str>, model: Option<&str>) {
    if let Some(base) = api_base {
        set_env_var(super::env_keys::llm::API_BASE, base);
    }
    if let Some(key) = api_key {
        set_env_var(super::env_keys::llm::API_KEY, key);
    }
    if let Some(model) = model {
        set_env_var(super::env_keys::llm::MODEL, model);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dotenv_quotes_and_comments() {
        let pairs = parse_dotenv(
            "# comment\nA=1\nB=\"two words\"\nC=three # trailing\n\nD='x#y'\nbroken\n",
        );
        assert_eq!(
            pairs,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "two words".to_string()),
                ("C".to_string(), "three".to_string()),
                ("D".to_string(), "x#y".to_string()),
            ]
        );
    }

    #[test]
    fn test_env_bool_and_usize_fallbacks() {
        set_env_var("CHAINLITE_TEST_LOADER_BOOL", "off");
        set_env_var("CHAINLITE_TEST_LOADER_NUM", "not-a-number");
        assert!(!env_bool("CHAINLITE_TEST_LOADER_BOOL", &[], true));
        assert!(env_bool("CHAINLITE_TEST_LOADER_MISSING", &[], true));
        assert_eq!(env_usize("CHAINLITE_TEST_LOADER_NUM", &[], 7), 7);
        remove_env_var("CHAINLITE_TEST_LOADER_BOOL");
        remove_env_var("CHAINLITE_TEST_LOADER_NUM");
    }

    #[test]
    fn test_env_optional_uses_alias_and_ignores_blank() {
        set_env_var("CHAINLITE_TEST_LOADER_PRIMARY", "  ");
        set_env_var("CHAINLITE_TEST_LOADER_ALIAS", "from-alias");
        assert_eq!(env_optional("CHAINLITE_TEST_LOADER_PRIMARY", &[]), None);
        assert_eq!(
            env_optional("CHAINLITE_TEST_LOADER_UNSET", &["CHAINLITE_TEST_LOADER_ALIAS"]),
            Some("from-alias".to_string())
        );
        remove_env_var("CHAINLITE_TEST_LOADER_PRIMARY");
        remove_env_var("CHAINLITE_TEST_LOADER_ALIAS");
    }
}
