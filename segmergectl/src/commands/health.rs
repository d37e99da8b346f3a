use std::fmt;
use std::fs;
use std::path::Path;

use serde::Serialize;

use segmerge_core::{CommandExecutor, SystemCommandExecutor};

use crate::{AppContext, DisplayFallback};

#[derive(Debug, Serialize)]
pub struct HealthEntry {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub enum CheckStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "error")]
    Error,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warn => "WARN",
            CheckStatus::Error => "ERROR",
        };
        write!(f, "{}", label)
    }
}

impl HealthEntry {
    pub fn ok(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Ok,
            detail: detail.into(),
        }
    }

    pub fn warn(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Warn,
            detail: detail.into(),
        }
    }

    pub fn error(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Error,
            detail: detail.into(),
        }
    }
}

/// Binaries are errors when missing; directories are created on demand, so
/// their absence only warns.
pub(crate) fn check(context: &AppContext) -> Vec<HealthEntry> {
    let config = &context.config;
    let store_dir = config.data_dir().join(&config.paths.video_dir);
    let mut config_entry = check_file("segmerge.toml", &context.config_path);
    config_entry.detail = format!(
        "{} ({} / {})",
        config_entry.detail, config.system.app_name, config.system.environment
    );
    vec![
        config_entry,
        check_binary("ffmpeg", &config.engine.ffmpeg_binary),
        check_binary("ffprobe", &config.engine.ffprobe_binary),
        check_directory("content store", &store_dir),
        check_directory("cache_dir", &config.cache_dir()),
        check_directory("output_dir", &config.output_dir()),
    ]
}

fn check_file(name: &str, path: &Path) -> HealthEntry {
    if path.exists() {
        HealthEntry::ok(name, format!("{}", path.display()))
    } else {
        HealthEntry::error(name, format!("{path} missing", path = path.display()))
    }
}

fn check_binary(name: &str, binary: &str) -> HealthEntry {
    match SystemCommandExecutor.locate(Path::new(binary)) {
        Some(path) => HealthEntry::ok(name, format!("{}", path.display())),
        None => HealthEntry::error(name, format!("{binary} not found on PATH")),
    }
}

fn check_directory(name: &str, path: &Path) -> HealthEntry {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => HealthEntry::ok(name, format!("{}", path.display())),
        Ok(_) => HealthEntry::error(
            name,
            format!("{path} is not a directory", path = path.display()),
        ),
        Err(_) => HealthEntry::warn(
            name,
            format!("{path} not found", path = path.display()),
        ),
    }
}

impl DisplayFallback for Vec<HealthEntry> {
    fn display(&self) -> String {
        self.iter()
            .map(|entry| entry.display())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl DisplayFallback for HealthEntry {
    fn display(&self) -> String {
        format!(
            "[{status}] {name}: {detail}",
            status = self.status,
            name = self.name,
            detail = self.detail
        )
    }
}
