#![allow(clippy::multiple_crate_versions)]

use serde::{Deserialize, Serialize};
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

pub const APP_NAME: &str = "tracery";

/// A value read from the config file, an environment variable or the output
/// of a shell command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Secret {
    Literal(String),
    Env { env: String },
    Cmd { cmd: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginConfig {
    /// Nickname or email used by `login`
    pub user: Option<String>,
    pub password: Option<Secret>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_true")]
    pub color: bool,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            color: true,
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceryConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,
    /// Where the credential is persisted; defaults to the config directory
    pub state_dir: Option<PathBuf>,
    #[serde(default)]
    pub login: LoginConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

impl Default for TraceryConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            search_debounce_ms: default_search_debounce_ms(),
            state_dir: None,
            login: LoginConfig::default(),
            display: DisplayConfig::default(),
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_page_size() -> usize {
    20
}

fn default_base_url() -> String {
    "http://localhost:3000/api".to_string()
}

const fn default_timeout_ms() -> u64 {
    1000
}

const fn default_search_debounce_ms() -> u64 {
    500
}

#[derive(Debug, thiserror::Error)]
pub enum TraceryConfigError {
    #[error("config error: {0}")]
    Confy(#[from] confy::ConfyError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("missing {field}; set it in the [login] section of the tracery config file")]
    Missing { field: &'static str },
    #[error("environment variable '{env}' not found")]
    MissingEnv { env: String },
    #[error("secret command failed: {cmd}: {message}")]
    CommandFailed { cmd: String, message: String },
    #[error("failed to execute secret command '{cmd}': {source}")]
    CommandExec { cmd: String, source: io::Error },
    #[error("secret command returned empty output: {cmd}")]
    CommandEmpty { cmd: String },
    #[error(
        "{field} required but stdin is not interactive; set it under [login] in {path} (example: password = {{ env = \"TRACERY_PASSWORD\" }})",
        path = .path.display()
    )]
    NonInteractive { field: &'static str, path: PathBuf },
    #[error("config file {path} has no parent directory; set `state_dir`", path = .path.display())]
    NoStateDir { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, TraceryConfigError>;

impl TraceryConfig {
    /// Loads the config file from the standard OS location.
    ///
    /// # Errors
    /// Returns an error if the config file cannot be read or deserialized.
    pub fn load() -> Result<Self> {
        Ok(confy::load(APP_NAME, None)?)
    }

    /// Stores the config to the standard OS location.
    ///
    /// # Errors
    /// Returns an error if the config cannot be serialized or written.
    pub fn store(&self) -> Result<()> {
        confy::store(APP_NAME, None, self)?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the OS config location cannot be determined.
    pub fn config_path() -> Result<PathBuf> {
        Ok(confy::get_configuration_file_path(APP_NAME, None)?)
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub const fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    /// Directory for persisted client state.
    ///
    /// # Errors
    /// Returns an error if no `state_dir` is set and the config location
    /// cannot be determined.
    pub fn state_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.state_dir {
            return Ok(dir.clone());
        }
        let path = Self::config_path()?;
        path.parent()
            .map(PathBuf::from)
            .ok_or(TraceryConfigError::NoStateDir { path })
    }

    /// The configured login, or one typed at the terminal.
    ///
    /// # Errors
    /// Returns an error if nothing is configured and stdin is not a terminal.
    pub fn login_user(&self) -> Result<String> {
        match self.login.user.as_deref().map(str::trim) {
            Some(user) if !user.is_empty() => Ok(user.to_string()),
            _ => prompt("login", "Login (nickname or email): "),
        }
    }

    /// The configured password secret, resolved, or one typed at the terminal.
    ///
    /// # Errors
    /// Returns an error if the secret cannot be resolved, or if nothing is
    /// configured and stdin is not a terminal.
    pub fn password(&self) -> Result<String> {
        match &self.login.password {
            Some(secret) => secret.resolve("password"),
            None => prompt("password", "Password: "),
        }
    }
}

/// Reads one line from an interactive stdin.
///
/// # Errors
/// Returns an error if stdin is not a terminal or the answer is empty.
pub fn prompt(field: &'static str, label: &str) -> Result<String> {
    if !io::stdin().is_terminal() {
        return Err(TraceryConfigError::NonInteractive {
            field,
            path: TraceryConfig::config_path()?,
        });
    }

    eprint!("{label}");
    io::stderr().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    non_empty(&input, || TraceryConfigError::Missing { field })
}

/// Trimmed `raw`, or `empty()` when nothing but whitespace is left.
fn non_empty(raw: &str, empty: impl FnOnce() -> TraceryConfigError) -> Result<String> {
    match raw.trim() {
        "" => Err(empty()),
        value => Ok(value.to_string()),
    }
}

fn run_secret_command(cmd: &str) -> Result<String> {
    let output = Command::new("sh")
        .args(["-c", cmd])
        .output()
        .map_err(|source| TraceryConfigError::CommandExec {
            cmd: cmd.to_string(),
            source,
        })?;
    if !output.status.success() {
        return Err(TraceryConfigError::CommandFailed {
            cmd: cmd.to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

impl Secret {
    fn resolve(&self, field: &'static str) -> Result<String> {
        let missing = || TraceryConfigError::Missing { field };
        match self {
            Self::Literal(value) => non_empty(value, missing),
            Self::Env { env } => {
                let value = std::env::var(env)
                    .map_err(|_| TraceryConfigError::MissingEnv { env: env.clone() })?;
                non_empty(&value, missing)
            }
            Self::Cmd { cmd } => non_empty(&run_secret_command(cmd)?, || {
                TraceryConfigError::CommandEmpty { cmd: cmd.clone() }
            }),
        }
    }
}
