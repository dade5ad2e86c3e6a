//! Workflow configuration from YAML

use crate::core::event::EventDescriptor;
use crate::core::run::{Run, WorkspaceMode};
use crate::core::trigger::TriggerPolicy;
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Component, Path};

/// Top-level workflow configuration loaded from YAML
///
/// Every section is optional; omitted sections fall back to the
/// `bigdbm` test workflow (see [`WorkflowConfig::default`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Workflow name
    #[serde(default = "default_name")]
    pub name: String,

    /// Events that start a run
    #[serde(default)]
    pub on: TriggerConfig,

    /// Secrets written to the env file before the build
    #[serde(default)]
    pub secrets: SecretsConfig,

    /// Checkout step settings
    #[serde(default)]
    pub checkout: CheckoutConfig,

    /// Image build step settings
    #[serde(default)]
    pub build: BuildConfig,

    /// Containerized test step settings
    #[serde(default)]
    pub test: TestConfig,
}

/// Trigger configuration, mirroring the workflow `on:` block
///
/// Within an explicit `on:` block an omitted trigger is disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default, deserialize_with = "present_or_default")]
    pub push: Option<PushTrigger>,

    #[serde(default, deserialize_with = "present_or_default")]
    pub pull_request: Option<PullRequestTrigger>,

    #[serde(default, deserialize_with = "flag_or_presence")]
    pub workflow_dispatch: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushTrigger {
    /// Pushes touching only these paths are ignored
    #[serde(default, alias = "paths-ignore")]
    pub paths_ignore: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestTrigger {
    /// Pull request actions that start a run
    #[serde(default = "default_pull_request_types")]
    pub types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// Secret names, resolved from the secret store
    #[serde(default = "default_secret_names")]
    pub names: Vec<String>,

    /// Env file written into the workspace root
    #[serde(default = "default_env_file")]
    pub env_file: String,

    /// Fail the run before the build when a secret is unset or empty
    #[serde(default)]
    pub require_non_empty: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckoutConfig {
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Container CLI (`docker` or `podman`)
    #[serde(default = "default_runtime")]
    pub runtime: String,

    /// Image repository name; each run tags it with its own id
    #[serde(default = "default_image")]
    pub image: String,

    /// Build context, relative to the workspace root
    #[serde(default = "default_context")]
    pub context: String,

    /// Dockerfile path, relative to the workspace root
    #[serde(default)]
    pub dockerfile: Option<String>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    /// Shell used inside the container
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Test-only dependency install command, run before `command`
    #[serde(default = "default_install")]
    pub install: Option<String>,

    /// Test runner command
    #[serde(default = "default_test_command")]
    pub command: String,

    /// Pass the env file to the container with `--env-file`
    #[serde(default)]
    pub pass_env_file: bool,

    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_name() -> String {
    "tests".to_string()
}

fn default_pull_request_types() -> Vec<String> {
    vec![
        "opened".to_string(),
        "synchronize".to_string(),
        "reopened".to_string(),
    ]
}

fn default_secret_names() -> Vec<String> {
    vec!["CLIENT_ID".to_string(), "CLIENT_SECRET".to_string()]
}

fn default_env_file() -> String {
    ".env".to_string()
}

fn default_runtime() -> String {
    "docker".to_string()
}

fn default_image() -> String {
    "bigdbm".to_string()
}

fn default_context() -> String {
    ".".to_string()
}

fn default_shell() -> String {
    "sh".to_string()
}

fn default_install() -> Option<String> {
    Some("pip install -r tests/requirements.txt".to_string())
}

fn default_test_command() -> String {
    "pytest".to_string()
}

/// `push:` with no body still enables the trigger
fn present_or_default<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Some(Option::<T>::deserialize(deserializer)?.unwrap_or_default()))
}

/// `workflow_dispatch:` accepts a bool, an empty value or a mapping
fn flag_or_presence<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_yaml::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_yaml::Value::Bool(flag)) => flag,
        _ => true,
    })
}

impl Default for PullRequestTrigger {
    fn default() -> Self {
        Self {
            types: default_pull_request_types(),
        }
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            push: Some(PushTrigger {
                paths_ignore: vec![
                    "README.md".to_string(),
                    ".devcontainer/**".to_string(),
                    ".vscode/**".to_string(),
                    ".gitignore".to_string(),
                    "pyproject.toml".to_string(),
                ],
            }),
            pull_request: Some(PullRequestTrigger {
                types: vec!["opened".to_string(), "reopened".to_string()],
            }),
            workflow_dispatch: true,
        }
    }
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            names: default_secret_names(),
            env_file: default_env_file(),
            require_non_empty: false,
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            runtime: default_runtime(),
            image: default_image(),
            context: default_context(),
            dockerfile: None,
            timeout_secs: None,
        }
    }
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            install: default_install(),
            command: default_test_command(),
            pass_env_file: false,
            timeout_secs: None,
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            on: TriggerConfig::default(),
            secrets: SecretsConfig::default(),
            checkout: CheckoutConfig::default(),
            build: BuildConfig::default(),
            test: TestConfig::default(),
        }
    }
}

impl TestConfig {
    /// The command sequence run inside the container
    pub fn script(&self) -> String {
        match self.install.as_deref().map(str::trim) {
            Some(install) if !install.is_empty() => format!("{} && {}", install, self.command),
            _ => self.command.clone(),
        }
    }
}

impl WorkflowConfig {
    /// Load workflow configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse workflow configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: WorkflowConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the workflow configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Workflow name must not be empty");
        }

        TriggerPolicy::from_config(&self.on)?;

        let env_name = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")?;
        let mut seen = std::collections::HashSet::new();
        for name in &self.secrets.names {
            if !env_name.is_match(name) {
                anyhow::bail!("Secret name '{}' is not a valid environment variable name", name);
            }
            if !seen.insert(name) {
                anyhow::bail!("Duplicate secret name: {}", name);
            }
        }

        check_relative("secrets.env_file", &self.secrets.env_file)?;
        check_relative("build.context", &self.build.context)?;
        if let Some(dockerfile) = &self.build.dockerfile {
            check_relative("build.dockerfile", dockerfile)?;
        }

        if self.build.runtime.trim().is_empty() {
            anyhow::bail!("build.runtime must not be empty");
        }

        // Repository part of an image reference; the tag is generated per run
        let image_name =
            Regex::new(r"^[a-z0-9]+(?:[._-][a-z0-9]+)*(?:/[a-z0-9]+(?:[._-][a-z0-9]+)*)*$")?;
        if !image_name.is_match(&self.build.image) {
            anyhow::bail!(
                "build.image '{}' is not a valid image name (lowercase, no tag)",
                self.build.image
            );
        }

        if self.test.command.trim().is_empty() {
            anyhow::bail!("test.command must not be empty");
        }
        if self.test.shell.trim().is_empty() {
            anyhow::bail!("test.shell must not be empty");
        }

        for (field, timeout) in [
            ("checkout.timeout_secs", self.checkout.timeout_secs),
            ("build.timeout_secs", self.build.timeout_secs),
            ("test.timeout_secs", self.test.timeout_secs),
        ] {
            if timeout == Some(0) {
                anyhow::bail!("{} must be greater than zero", field);
            }
        }

        Ok(())
    }

    /// Compile the trigger policy
    pub fn trigger_policy(&self) -> Result<TriggerPolicy> {
        TriggerPolicy::from_config(&self.on)
    }

    /// Create a run of this workflow for an event
    pub fn to_run(&self, event: EventDescriptor, workspace: WorkspaceMode) -> Run {
        Run::from_config(self, event, workspace)
    }
}

/// Paths in the config must stay inside the workspace
fn check_relative(field: &str, value: &str) -> Result<()> {
    let path = Path::new(value);
    if value.trim().is_empty() {
        anyhow::bail!("{} must not be empty", field);
    }
    if path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        anyhow::bail!("{} must be a path inside the workspace: {}", field, value);
    }
    Ok(())
}
