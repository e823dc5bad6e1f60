use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SqlPoolError;

static LIBRARY_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s,]+").expect("library separator pattern is valid"));

fn default_initial_pool_count() -> u32 {
    1
}

/// Options applied when the pool is (re-)initialized.
///
/// Field names follow the camelCase shape hosts already pass around, so a
/// config can be read straight from JSON:
/// ```rust
/// use sql_pool_middleware::PoolConfig;
///
/// let cfg: PoolConfig = serde_json::from_str(
///     r#"{"host":"db.example","libraries":"APPLIB, QGPL","username":"u","password":"p"}"#,
/// ).unwrap();
/// assert_eq!(cfg.initial_pool_count, 1);
/// assert_eq!(cfg.library_list(), vec!["APPLIB", "QGPL"]);
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfig {
    pub host: String,
    /// Comma or whitespace separated library/schema list.
    pub libraries: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_initial_pool_count")]
    pub initial_pool_count: u32,
    /// Upper bound on pooled connections; defaults to `initial_pool_count`.
    #[serde(default)]
    pub max_pool_count: Option<u32>,
    #[serde(default)]
    pub secure: bool,
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("host", &self.host)
            .field("libraries", &self.libraries)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("initial_pool_count", &self.initial_pool_count)
            .field("max_pool_count", &self.max_pool_count)
            .field("secure", &self.secure)
            .finish()
    }
}

impl PoolConfig {
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        libraries: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            libraries: libraries.into(),
            username: username.into(),
            password: password.into(),
            initial_pool_count: default_initial_pool_count(),
            max_pool_count: None,
            secure: false,
        }
    }

    #[must_use]
    pub fn builder(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> PoolConfigBuilder {
        PoolConfigBuilder::new(host, username, password)
    }

    /// Libraries in declaration order, without separators or blanks.
    #[must_use]
    pub fn library_list(&self) -> Vec<&str> {
        LIBRARY_SEPARATOR
            .split(self.libraries.trim())
            .filter(|lib| !lib.is_empty())
            .collect()
    }

    /// Connections to open up front; an unset (zero) count means one.
    #[must_use]
    pub fn effective_initial_count(&self) -> usize {
        self.initial_pool_count.max(1) as usize
    }

    /// Capacity of the pool; never below the initial count.
    #[must_use]
    pub fn effective_max_size(&self) -> usize {
        let initial = self.effective_initial_count();
        self.max_pool_count
            .map_or(initial, |max| (max as usize).max(initial))
    }

    /// Check the fields needed to build a pool.
    ///
    /// # Errors
    /// Returns `SqlPoolError::Config` naming the first missing field.
    pub fn validate(&self) -> Result<(), SqlPoolError> {
        if self.host.trim().is_empty() {
            return Err(SqlPoolError::Config("host must not be empty".into()));
        }
        if self.username.trim().is_empty() || self.password.is_empty() {
            return Err(SqlPoolError::Config(
                "username and password must not be empty".into(),
            ));
        }
        if self.library_list().is_empty() {
            return Err(SqlPoolError::Config(
                "library list must name at least one library".into(),
            ));
        }
        Ok(())
    }
}

/// Fluent builder for [`PoolConfig`].
#[derive(Debug, Clone)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            config: PoolConfig::new(host, String::new(), username, password),
        }
    }

    /// Append one library to the list.
    #[must_use]
    pub fn library(mut self, library: impl AsRef<str>) -> Self {
        if !self.config.libraries.is_empty() {
            self.config.libraries.push(',');
        }
        self.config.libraries.push_str(library.as_ref());
        self
    }

    #[must_use]
    pub fn libraries(mut self, libraries: impl Into<String>) -> Self {
        self.config.libraries = libraries.into();
        self
    }

    #[must_use]
    pub fn initial_pool_count(mut self, count: u32) -> Self {
        self.config.initial_pool_count = count;
        self
    }

    #[must_use]
    pub fn max_pool_count(mut self, count: u32) -> Self {
        self.config.max_pool_count = Some(count);
        self
    }

    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.config.secure = secure;
        self
    }

    #[must_use]
    pub fn finish(self) -> PoolConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_list_splits_on_commas_and_spaces() {
        let cfg = PoolConfig::new("h", " LIB1,LIB2  LIB3 ,", "u", "p");
        assert_eq!(cfg.library_list(), vec!["LIB1", "LIB2", "LIB3"]);
    }

    #[test]
    fn validate_rejects_missing_fields() {
        assert!(PoolConfig::new("", "LIB", "u", "p").validate().is_err());
        assert!(PoolConfig::new("h", "LIB", "", "p").validate().is_err());
        assert!(PoolConfig::new("h", " , ", "u", "p").validate().is_err());
        assert!(PoolConfig::new("h", "LIB", "u", "p").validate().is_ok());
    }

    #[test]
    fn pool_sizes_default_and_clamp() {
        let cfg = PoolConfig::builder("h", "u", "p").library("L").finish();
        assert_eq!(cfg.effective_initial_count(), 1);
        assert_eq!(cfg.effective_max_size(), 1);

        let cfg = PoolConfig::builder("h", "u", "p")
            .library("L")
            .initial_pool_count(4)
            .max_pool_count(2)
            .finish();
        assert_eq!(cfg.effective_max_size(), 4);

        let zero = PoolConfig::builder("h", "u", "p")
            .initial_pool_count(0)
            .finish();
        assert_eq!(zero.effective_initial_count(), 1);
    }

    #[test]
    fn builder_joins_libraries() {
        let cfg = PoolConfig::builder("h", "u", "p")
            .library("A")
            .library("B")
            .secure(true)
            .finish();
        assert_eq!(cfg.libraries, "A,B");
        assert!(cfg.secure);
    }

    #[test]
    fn debug_redacts_password() {
        let cfg = PoolConfig::new("h", "L", "u", "hunter2");
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn deserializes_camel_case_fields() {
        let cfg: PoolConfig = serde_json::from_str(
            r#"{"host":"h","libraries":"L","username":"u","password":"p","initialPoolCount":3,"secure":true}"#,
        )
        .unwrap();
        assert_eq!(cfg.initial_pool_count, 3);
        assert!(cfg.secure);
        assert_eq!(cfg.max_pool_count, None);
    }
}
