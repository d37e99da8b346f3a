use std::path::PathBuf;

use clap::{Args, Subcommand};
use serde::Serialize;

use segmerge_core::merge::partition;
use segmerge_core::{flatten, PracticePlan};

use super::merge::ProfileChoice;
use crate::{AppContext, DisplayFallback, Result};

#[derive(Subcommand, Debug)]
pub enum PlanCommands {
    /// Show the flattened play order and how it would be chunked
    Show(PlanShowArgs),
}

#[derive(Args, Debug)]
pub struct PlanShowArgs {
    /// Plan document (JSON, as served by the origin)
    #[arg(long)]
    pub plan: PathBuf,
    /// Device class used to pick the chunk size
    #[arg(long, value_enum, default_value_t = ProfileChoice::Auto)]
    pub profile: ProfileChoice,
}

#[derive(Debug, Serialize)]
pub struct PlanPreview {
    pub title: String,
    pub order: Vec<String>,
    pub chunk_size: usize,
    pub chunks: Vec<Vec<String>>,
}

pub(crate) fn show(context: &AppContext, args: &PlanShowArgs) -> Result<PlanPreview> {
    let plan = PracticePlan::from_path(&args.plan)?;
    let order: Vec<String> = flatten(&plan.asana_list)?
        .iter()
        .map(|segment| segment.key.to_string())
        .collect();
    let chunk_size = args
        .profile
        .resolve(&context.config.merge)
        .chunk_size(&context.config.merge);
    let chunks = partition(&order, chunk_size);

    Ok(PlanPreview {
        title: plan.title,
        order,
        chunk_size,
        chunks,
    })
}

impl DisplayFallback for PlanPreview {
    fn display(&self) -> String {
        let title = if self.title.is_empty() {
            "(untitled plan)"
        } else {
            self.title.as_str()
        };
        let mut lines = vec![format!(
            "{title}: {} segments, chunk size {}",
            self.order.len(),
            self.chunk_size
        )];
        for (index, chunk) in self.chunks.iter().enumerate() {
            lines.push(format!("  chunk {}: {}", index + 1, chunk.join(", ")));
        }
        lines.join("\n")
    }
}
