use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::naming::NamingPolicy;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 500 * 1024 * 1024;
pub const DEFAULT_VIDEOS_DIR: &str = "videos";
pub const DEFAULT_REMOTE: &str = "origin";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(60);

pub const PORT_VAR: &str = "VIDVAULT_PORT";
pub const FALLBACK_PORT_VAR: &str = "PORT";
pub const VIDEOS_DIR_VAR: &str = "VIDVAULT_VIDEOS_DIR";
pub const MAX_FILE_SIZE_VAR: &str = "VIDVAULT_MAX_FILE_SIZE";
pub const NAMING_VAR: &str = "VIDVAULT_NAMING";
pub const MIRROR_VAR: &str = "VIDVAULT_MIRROR";
pub const GIT_DIR_VAR: &str = "VIDVAULT_GIT_DIR";
pub const GIT_REMOTE_VAR: &str = "VIDVAULT_GIT_REMOTE";
pub const GIT_BRANCH_VAR: &str = "VIDVAULT_GIT_BRANCH";
pub const GIT_TIMEOUT_VAR: &str = "VIDVAULT_GIT_TIMEOUT_SECS";
pub const MIRROR_SERIALIZE_VAR: &str = "VIDVAULT_MIRROR_SERIALIZE";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Everything the server needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub videos_dir: PathBuf,
    pub max_file_size: u64,
    pub naming: NamingPolicy,
    /// `None` disables mirroring
    pub mirror: Option<MirrorConfig>,
}

/// Settings of the git mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    /// Working copy the version control client runs in
    pub workdir: PathBuf,
    /// Executable invoked for every step
    pub program: PathBuf,
    pub remote: String,
    pub branch: String,
    /// Bound on every single external command
    pub command_timeout: Duration,
    /// Hold a process wide lock for the whole pull/add/commit/push sequence
    pub serialize: bool,
}

impl MirrorConfig {
    /// Defaults for a working copy that contains `videos_dir`.
    #[must_use]
    pub fn for_videos_dir(videos_dir: &Path) -> Self {
        let workdir = videos_dir
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        Self {
            workdir,
            program: PathBuf::from("git"),
            remote: DEFAULT_REMOTE.to_owned(),
            branch: DEFAULT_BRANCH.to_owned(),
            command_timeout: DEFAULT_GIT_TIMEOUT,
            serialize: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            videos_dir: PathBuf::from(DEFAULT_VIDEOS_DIR),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            naming: NamingPolicy::UniqueSuffix,
            mirror: None,
        }
    }
}

impl ServerConfig {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ServerConfig::default();

        if let Some((name, value)) = first_set(&lookup, &[PORT_VAR, FALLBACK_PORT_VAR]) {
            config.port = parse(name, &value)?;
        }
        if let Some(dir) = lookup(VIDEOS_DIR_VAR) {
            config.videos_dir = PathBuf::from(dir);
        }
        if let Some(value) = lookup(MAX_FILE_SIZE_VAR) {
            config.max_file_size = parse(MAX_FILE_SIZE_VAR, &value)?;
        }
        if let Some(value) = lookup(NAMING_VAR) {
            config.naming = parse(NAMING_VAR, &value)?;
        }

        let mirror_enabled = match lookup(MIRROR_VAR) {
            Some(value) => parse_flag(MIRROR_VAR, &value)?,
            None => false,
        };
        if mirror_enabled {
            let mut mirror = MirrorConfig::for_videos_dir(&config.videos_dir);
            if let Some(dir) = lookup(GIT_DIR_VAR) {
                mirror.workdir = PathBuf::from(dir);
            }
            if let Some(remote) = lookup(GIT_REMOTE_VAR) {
                mirror.remote = remote;
            }
            if let Some(branch) = lookup(GIT_BRANCH_VAR) {
                mirror.branch = branch;
            }
            if let Some(value) = lookup(GIT_TIMEOUT_VAR) {
                let secs: u64 = parse(GIT_TIMEOUT_VAR, &value)?;
                mirror.command_timeout = Duration::from_secs(secs);
            }
            if let Some(value) = lookup(MIRROR_SERIALIZE_VAR) {
                mirror.serialize = parse_flag(MIRROR_SERIALIZE_VAR, &value)?;
            }
            config.mirror = Some(mirror);
        }

        Ok(config)
    }
}

fn first_set<F>(lookup: &F, names: &[&'static str]) -> Option<(&'static str, String)>
where
    F: Fn(&str) -> Option<String>,
{
    names
        .iter()
        .find_map(|name| lookup(name).map(|value| (*name, value)))
}

fn parse<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        value: value.to_owned(),
        reason: e.to_string(),
    })
}

pub(crate) fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_owned(),
            reason: "expected true or false".to_owned(),
        }),
    }
}
