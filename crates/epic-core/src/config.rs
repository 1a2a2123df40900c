//! Environment Configuration Loader
//!
//! Loads the process environment, optionally combined with a dotenv-style
//! file (default: `.env` in the working directory), into an immutable
//! [`Environment`] map shared by every Epic component.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use epic_core::config::Environment;
//!
//! let env = Environment::load(".env").unwrap();
//! let theme = env.get_or("THEME", "default");
//! ```
//!
//! Variables already present in the process environment win over the file,
//! the same way `dotenv` behaves.

use crate::{Error, Result};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default path for the environment file
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Read-only environment snapshot.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: BTreeMap<String, String>,
    source: Option<PathBuf>,
}

impl Environment {
    /// Load the process environment, merged over `path` if that file exists.
    ///
    /// A missing file is not an error. A file that exists but cannot be
    /// read is.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut env = Self::default();

        let path = path.as_ref();
        if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                Error::Environment(format!("failed to read {}: {}", path.display(), e))
            })?;
            let pairs = parse_env_file(&content);
            info!(
                "Loaded {} environment variables from {}",
                pairs.len(),
                path.display()
            );
            env.vars.extend(pairs);
            env.source = Some(path.to_path_buf());
        } else {
            debug!("No environment file at {}, using process environment", path.display());
        }

        let mut overridden = 0;
        for (key, value) in unicode_vars(std::env::vars_os()) {
            if env.vars.insert(key, value).is_some() {
                overridden += 1;
            }
        }
        if overridden > 0 {
            debug!("{} file variables overridden by the process environment", overridden);
        }

        Ok(env)
    }

    /// Build an environment from explicit pairs, ignoring the process
    /// environment entirely.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            source: None,
        }
    }

    /// File the environment was (partly) loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Raw value, including empty strings.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Value if set and not empty.
    pub fn get_opt(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    /// Value with a default for unset or empty variables.
    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get_opt(key).unwrap_or(default).to_string()
    }

    /// Boolean value (`true`, `1`, `yes`, `on`).
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get_opt(key)
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
            .unwrap_or(default)
    }

    /// Integer value, `None` when unset or not a number.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get_opt(key).and_then(|v| v.trim().parse().ok())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get_opt(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Process variables whose name and value are valid UTF-8. Others are
/// skipped.
fn unicode_vars<I>(vars: I) -> impl Iterator<Item = (String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => Some((key, value)),
            (key, _) => {
                debug!("Skipping non UTF-8 environment variable {:?}", key);
                None
            }
        })
}

/// Parse the contents of a dotenv file, skipping comments and blank lines.
pub fn parse_env_file(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_env_line)
        .collect()
}

/// Parse a single environment line into key-value pair.
fn parse_env_line(line: &str) -> Option<(String, String)> {
    // Handle: KEY=VALUE, KEY="VALUE", KEY='VALUE', export KEY=VALUE
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    let value = value.trim();

    if key.is_empty() {
        return None;
    }

    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);

    Some((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_env_line_simple() {
        let (k, v) = parse_env_line("FOO=bar").unwrap();
        assert_eq!(k, "FOO");
        assert_eq!(v, "bar");
    }

    #[test]
    fn test_parse_env_line_quoted() {
        let (k, v) = parse_env_line("FOO=\"bar baz\"").unwrap();
        assert_eq!(k, "FOO");
        assert_eq!(v, "bar baz");

        let (_, v) = parse_env_line("FOO='bar'").unwrap();
        assert_eq!(v, "bar");
    }

    #[test]
    fn test_parse_env_line_export_and_empty() {
        let (k, v) = parse_env_line("export THEME=dark").unwrap();
        assert_eq!(k, "THEME");
        assert_eq!(v, "dark");
        assert!(parse_env_line("").is_none());
        assert!(parse_env_line("=value").is_none());
        assert!(parse_env_line("NOVALUE").is_none());
    }

    #[test]
    fn test_parse_env_file_skips_comments() {
        let pairs = parse_env_file("# comment\n\nHTTP=80\n  HTTPS = 443 \n");
        assert_eq!(
            pairs,
            vec![
                ("HTTP".to_string(), "80".to_string()),
                ("HTTPS".to_string(), "443".to_string()),
            ]
        );
    }

    #[test]
    fn test_load_reads_file_and_process_env_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "EPIC_TEST_ONLY_IN_FILE=from-file").unwrap();
        writeln!(file, "PATH=from-file").unwrap();

        let env = Environment::load(&path).unwrap();
        assert_eq!(env.get("EPIC_TEST_ONLY_IN_FILE"), Some("from-file"));
        assert_ne!(env.get("PATH"), Some("from-file"));
        assert_eq!(env.source(), Some(path.as_path()));
    }

    #[test]
    fn test_load_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let env = Environment::load(dir.path().join("missing.env")).unwrap();
        assert!(env.source().is_none());
    }

    #[test]
    fn test_typed_getters() {
        let env = Environment::from_pairs([
            ("HTTP", "80"),
            ("EMPTY", ""),
            ("FLAG", "Yes"),
            ("NAME", "epic"),
        ]);
        assert_eq!(env.get_int("HTTP"), Some(80));
        assert_eq!(env.get_int("NAME"), None);
        assert_eq!(env.get_opt("EMPTY"), None);
        assert_eq!(env.get("EMPTY"), Some(""));
        assert_eq!(env.get_or("EMPTY", "fallback"), "fallback");
        assert!(env.get_bool("FLAG", false));
        assert!(!env.get_bool("MISSING", false));
        assert!(!env.contains("EMPTY"));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_unicode_process_variables_are_skipped() {
        use std::os::unix::ffi::OsStringExt;

        let vars = vec![
            (OsString::from("GOOD"), OsString::from("yes")),
            (OsString::from("BAD_VALUE"), OsString::from_vec(vec![0x66, 0xff])),
            (OsString::from_vec(vec![0xfe]), OsString::from("x")),
        ];
        let kept: Vec<_> = unicode_vars(vars).collect();
        assert_eq!(kept, [("GOOD".to_string(), "yes".to_string())]);
    }
}
