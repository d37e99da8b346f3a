use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::plan::QualityTier;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SegmergeConfig {
    #[serde(default)]
    pub system: SystemSection,
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub loader: LoaderSection,
    #[serde(default)]
    pub merge: MergeSection,
    #[serde(default)]
    pub prefetch: PrefetchSection,
    #[serde(default)]
    pub engine: EngineSection,
}

impl SegmergeConfig {
    pub fn resolve_path<P: AsRef<Path>>(&self, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.paths.base_dir).join(path)
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.data_dir)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.cache_dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.output_dir)
    }

    /// Rebases every relative directory onto `base_dir`.
    pub fn with_base_dir<P: AsRef<Path>>(mut self, base_dir: P) -> Self {
        self.paths.base_dir = base_dir.as_ref().to_string_lossy().to_string();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.loader.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "loader.max_attempts",
                reason: "must be greater than zero".into(),
            });
        }
        if self.merge.low_chunk_size == 0 || self.merge.high_chunk_size == 0 {
            return Err(ConfigError::Invalid {
                field: "merge.*_chunk_size",
                reason: "chunk sizes must be greater than zero".into(),
            });
        }
        if !(0.0..1.0).contains(&self.merge.progress_ceiling) {
            return Err(ConfigError::Invalid {
                field: "merge.progress_ceiling",
                reason: format!("{} is outside [0, 1)", self.merge.progress_ceiling),
            });
        }
        if self.prefetch.workers == 0 {
            return Err(ConfigError::Invalid {
                field: "prefetch.workers",
                reason: "must be greater than zero".into(),
            });
        }
        if self.prefetch.task_timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "prefetch.task_timeout_seconds",
                reason: "a zero timeout would fail every prefetch task".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SystemSection {
    pub app_name: String,
    pub environment: String,
}

impl Default for SystemSection {
    fn default() -> Self {
        Self {
            app_name: "segmerge".into(),
            environment: "development".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub base_dir: String,
    pub data_dir: String,
    pub cache_dir: String,
    pub output_dir: String,
    pub video_dir: String,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            base_dir: ".".into(),
            data_dir: "data".into(),
            cache_dir: "cache".into(),
            output_dir: "merged".into(),
            video_dir: "asana-videos".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    pub base_url: String,
    pub connect_timeout_seconds: u64,
    pub read_timeout_seconds: u64,
    pub user_agent: String,
    pub range_requests: bool,
    pub tier_query_param: Option<String>,
}

impl NetworkSection {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_seconds)
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".into(),
            connect_timeout_seconds: 30,
            read_timeout_seconds: 60,
            user_agent: "segmerge/0.1".into(),
            range_requests: true,
            tier_query_param: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoaderSection {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub offline_cache: bool,
    pub native_default_tier: QualityTier,
    pub portable_default_tier: QualityTier,
}

impl Default for LoaderSection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 1000,
            offline_cache: true,
            native_default_tier: QualityTier::Low,
            portable_default_tier: QualityTier::High,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MergeSection {
    pub low_chunk_size: usize,
    pub high_chunk_size: usize,
    pub concurrency_threshold: usize,
    pub progress_ceiling: f64,
}

impl Default for MergeSection {
    fn default() -> Self {
        Self {
            low_chunk_size: 3,
            high_chunk_size: 5,
            concurrency_threshold: 4,
            progress_ceiling: 0.99,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrefetchSection {
    pub workers: usize,
    pub stagger_ms: u64,
    pub task_timeout_seconds: u64,
    pub cooldown_ms: u64,
}

impl PrefetchSection {
    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_seconds)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl Default for PrefetchSection {
    fn default() -> Self {
        Self {
            workers: 2,
            stagger_ms: 500,
            task_timeout_seconds: 70,
            cooldown_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStrategy {
    Auto,
    InProcess,
    Native,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub strategy: EngineStrategy,
    pub ffmpeg_binary: String,
    pub ffprobe_binary: String,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            strategy: EngineStrategy::Auto,
            ffmpeg_binary: "ffmpeg".into(),
            ffprobe_binary: "ffprobe".into(),
        }
    }
}

pub fn load_segmerge_config<P: AsRef<Path>>(path: P) -> Result<SegmergeConfig> {
    let config: SegmergeConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
