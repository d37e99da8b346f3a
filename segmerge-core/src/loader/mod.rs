//! Offline-first segment loader: content store first, then the network with
//! retry, then a direct-stream reference when nothing local can be produced.

mod error;
mod fetcher;

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{NetworkSection, SegmergeConfig};
use crate::media::{BlobRegistry, MediaRef};
use crate::plan::{QualityTier, SegmentKey};
use crate::retry::RetryPolicy;
use crate::store::{AssetKey, ContentStore, FsContentStore, Payload};

pub use error::{LoaderError, LoaderResult};
pub use fetcher::{HttpSegmentFetcher, SegmentFetcher};

const STREAM_PATH: [&str; 2] = ["videos", "stream"];

/// Where loaded bytes end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Offline-first through the filesystem content store.
    Filesystem,
    /// No durable storage; fetched bytes live in the blob registry.
    Portable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadOrigin {
    CacheHit,
    Fetched,
    /// Nothing was persisted; playback streams from the origin.
    DirectStream,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadedSegment {
    pub key: SegmentKey,
    pub reference: MediaRef,
    pub tier: QualityTier,
    pub origin: LoadOrigin,
    pub attempts: u32,
}

impl LoadedSegment {
    pub fn is_local(&self) -> bool {
        !matches!(self.origin, LoadOrigin::DirectStream)
    }
}

/// Builds `{base}/videos/stream/{code}` with the variant discriminator.
#[derive(Debug, Clone)]
pub struct SourceLocator {
    base: Url,
    tier_param: Option<String>,
}

impl SourceLocator {
    pub fn new(network: &NetworkSection) -> LoaderResult<Self> {
        let base = Url::parse(&network.base_url).map_err(|err| LoaderError::Url {
            url: network.base_url.clone(),
            reason: err.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(LoaderError::Url {
                url: network.base_url.clone(),
                reason: "cannot be used as a base".into(),
            });
        }
        Ok(Self {
            base,
            tier_param: network.tier_query_param.clone(),
        })
    }

    pub fn locate(&self, key: &SegmentKey, tier: QualityTier) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(STREAM_PATH.iter().copied().chain([key.code.as_str()]));
        }
        if key.variant.is_explanation() {
            url.query_pairs_mut().append_pair("explanation", "true");
        }
        if let Some(param) = &self.tier_param {
            url.query_pairs_mut().append_pair(param, tier.as_str());
        }
        url
    }
}

pub struct SegmentLoader {
    store: Arc<dyn ContentStore>,
    fetcher: Arc<dyn SegmentFetcher>,
    locator: SourceLocator,
    retry: RetryPolicy,
    mode: ExecutionMode,
    blobs: BlobRegistry,
    default_tier: QualityTier,
    offline_cache: bool,
}

impl SegmentLoader {
    pub fn new(config: &SegmergeConfig, mode: ExecutionMode) -> LoaderResult<Self> {
        let store = FsContentStore::new(config.data_dir(), &config.paths.video_dir);
        let default_tier = match mode {
            ExecutionMode::Filesystem => config.loader.native_default_tier,
            ExecutionMode::Portable => config.loader.portable_default_tier,
        };
        Ok(Self {
            store: Arc::new(store),
            fetcher: Arc::new(HttpSegmentFetcher::new(&config.network)?),
            locator: SourceLocator::new(&config.network)?,
            retry: RetryPolicy::try_from(&config.loader)?,
            mode,
            blobs: BlobRegistry::new(),
            default_tier,
            offline_cache: config.loader.offline_cache,
        })
    }

    pub fn with_store(mut self, store: Arc<dyn ContentStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn SegmentFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_blobs(mut self, blobs: BlobRegistry) -> Self {
        self.blobs = blobs;
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn default_tier(&self) -> QualityTier {
        self.default_tier
    }

    pub fn blobs(&self) -> &BlobRegistry {
        &self.blobs
    }

    pub fn fetcher(&self) -> Arc<dyn SegmentFetcher> {
        Arc::clone(&self.fetcher)
    }

    pub fn locator(&self) -> &SourceLocator {
        &self.locator
    }

    /// Resolves a segment to something playable. Never fails: when neither the
    /// store nor the network produce a local copy the result is a direct-stream
    /// reference to the origin.
    pub async fn load(
        &self,
        key: &SegmentKey,
        tier: Option<QualityTier>,
        token: Option<&str>,
    ) -> LoadedSegment {
        let tier = tier.unwrap_or(self.default_tier);
        let asset = AssetKey::new(key, tier);
        let url = self.locator.locate(key, tier);

        if self.mode == ExecutionMode::Filesystem && self.offline_cache {
            match self.store.resolve(&asset).await {
                Ok(Some(reference)) => {
                    debug!(segment = %key, tier = %tier, "content store hit");
                    return self.loaded(key, reference, tier, LoadOrigin::CacheHit, 0);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(segment = %key, error = %err, "content store lookup failed");
                }
            }
        }

        let fetcher = &self.fetcher;
        let target = &url;
        let fetched = self
            .retry
            .run("segment_fetch", move |_| fetcher.fetch(target, token))
            .await;
        let outcome = match fetched {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(
                    segment = %key,
                    attempts = self.retry.attempts(),
                    error = %err,
                    "segment fetch exhausted retries; falling back to direct stream"
                );
                return self.direct_stream(key, url, tier, self.retry.attempts());
            }
        };

        match self.persist(&asset, outcome.value).await {
            Ok(reference) => {
                info!(segment = %key, tier = %tier, attempts = outcome.attempts, "segment fetched");
                self.loaded(key, reference, tier, LoadOrigin::Fetched, outcome.attempts)
            }
            Err(err) => {
                warn!(
                    segment = %key,
                    error = %err,
                    "segment could not be kept locally; offline replay unavailable"
                );
                self.direct_stream(key, url, tier, outcome.attempts)
            }
        }
    }

    async fn persist(&self, asset: &AssetKey, payload: Payload) -> LoaderResult<MediaRef> {
        match self.mode {
            ExecutionMode::Filesystem => {
                self.store.write(asset, payload).await?;
                self.store
                    .resolve(asset)
                    .await?
                    .ok_or_else(|| LoaderError::Unresolved(asset.file_name()))
            }
            ExecutionMode::Portable => Ok(self.blobs.create(payload.into_bytes()?)),
        }
    }

    fn direct_stream(
        &self,
        key: &SegmentKey,
        url: Url,
        tier: QualityTier,
        attempts: u32,
    ) -> LoadedSegment {
        self.loaded(key, MediaRef::Remote(url), tier, LoadOrigin::DirectStream, attempts)
    }

    fn loaded(
        &self,
        key: &SegmentKey,
        reference: MediaRef,
        tier: QualityTier,
        origin: LoadOrigin,
        attempts: u32,
    ) -> LoadedSegment {
        LoadedSegment {
            key: key.clone(),
            reference,
            tier,
            origin,
            attempts,
        }
    }
}
