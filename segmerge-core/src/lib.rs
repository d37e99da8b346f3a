pub mod config;
pub mod engine;
pub mod error;
pub mod loader;
pub mod media;
pub mod merge;
pub mod plan;
pub mod platform;
pub mod retry;
pub mod store;

pub use config::{load_segmerge_config, EngineStrategy, SegmergeConfig};
pub use engine::{
    build_engine, CommandExecutor, EngineDeps, EngineError, EngineKind, EngineSession,
    FfmpegMuxPlugin, InProcessEngine, MuxPlugin, NativeEngine, SystemCommandExecutor,
    TranscodeEngine,
};
pub use error::{ConfigError, Result};
pub use loader::{
    ExecutionMode, HttpSegmentFetcher, LoadOrigin, LoadedSegment, LoaderError, SegmentFetcher,
    SegmentLoader, SourceLocator,
};
pub use media::{BlobRegistry, MediaError, MediaRef};
pub use merge::{
    JobState, MergeCoordinator, MergeError, MergeOptions, MergeOrchestrator, MergeOutcome,
    PlaybackFallback, ProgressCallback, ProgressEvent,
};
pub use plan::{flatten, PlanEntry, PlanError, PracticePlan, QualityTier, SegmentKey};
pub use platform::{DeviceProfile, Platform};
pub use retry::RetryPolicy;
pub use store::{AssetKey, ContentStore, FsContentStore, Payload, StoreError};
