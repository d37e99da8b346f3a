use clap::Subcommand;
use serde::Serialize;

use segmerge_core::store::CachedAsset;
use segmerge_core::FsContentStore;

use crate::{AppContext, DisplayFallback, Result};

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// List every asset in the content store
    List,
}

#[derive(Debug, Serialize)]
pub struct CacheListing {
    pub root: String,
    pub total_bytes: u64,
    pub assets: Vec<CachedAsset>,
}

pub(crate) fn list(context: &AppContext) -> Result<CacheListing> {
    let store = FsContentStore::new(context.config.data_dir(), &context.config.paths.video_dir);
    let assets = store.entries()?;
    Ok(CacheListing {
        root: store.root().display().to_string(),
        total_bytes: assets.iter().map(|asset| asset.size_bytes).sum(),
        assets,
    })
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

impl DisplayFallback for CacheListing {
    fn display(&self) -> String {
        if self.assets.is_empty() {
            return "content store is empty".to_string();
        }
        let mut lines = Vec::with_capacity(self.assets.len() + 1);
        for asset in &self.assets {
            let tier = asset
                .tier
                .map(|tier| tier.to_string())
                .unwrap_or_else(|| "-".to_string());
            let variant = if asset.explanation { "explanation" } else { "main" };
            lines.push(format!(
                "{code:<20} {variant:<11} {tier:<6} {size:>10}",
                code = asset.code,
                size = human_size(asset.size_bytes)
            ));
        }
        lines.push(format!(
            "{} assets, {} in {}",
            self.assets.len(),
            human_size(self.total_bytes),
            self.root
        ));
        lines.join("\n")
    }
}
