//! Secret resolution and env file materialization

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// An opaque credential value
///
/// Never printed: `Debug` and `Display` render a mask.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the value would span several env file lines
    pub fn has_line_break(&self) -> bool {
        self.0.contains(['\n', '\r'])
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Source of secret values
pub trait SecretStore: Send + Sync {
    fn get(&self, name: &str) -> Option<Secret>;
}

/// Reads secrets from the process environment
#[derive(Debug, Clone, Default)]
pub struct EnvSecretStore;

impl SecretStore for EnvSecretStore {
    fn get(&self, name: &str) -> Option<Secret> {
        std::env::var(name).ok().map(Secret::new)
    }
}

/// Fixed secrets, for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct StaticSecretStore {
    values: HashMap<String, Secret>,
}

impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), Secret::new(value));
        self
    }
}

impl SecretStore for StaticSecretStore {
    fn get(&self, name: &str) -> Option<Secret> {
        self.values.get(name).cloned()
    }
}

/// Secrets resolved for one run, in configuration order
#[derive(Debug, Clone)]
pub struct SecretSet {
    entries: Vec<(String, Option<Secret>)>,
}

impl SecretSet {
    /// Resolve each name against the store; unknown names stay unset
    pub fn resolve(names: &[String], store: &dyn SecretStore) -> Self {
        Self {
            entries: names
                .iter()
                .map(|name| (name.clone(), store.get(name)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names whose value is unset or empty
    pub fn missing(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, value)| value.as_ref().map_or(true, Secret::is_empty))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Names whose value contains a line break
    pub fn multiline(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, value)| value.as_ref().is_some_and(Secret::has_line_break))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Render `KEY=value` lines; unset secrets get an empty value
    pub fn render_env_file(&self) -> String {
        self.entries
            .iter()
            .map(|(name, value)| {
                format!(
                    "{}={}\n",
                    name,
                    value.as_ref().map(Secret::expose).unwrap_or_default()
                )
            })
            .collect()
    }

    /// Write the env file, replacing any previous content
    pub async fn write_env_file(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, self.render_env_file()).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        Ok(())
    }
}
