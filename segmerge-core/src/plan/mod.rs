mod error;
mod flatten;
mod models;

pub use error::{PlanError, PlanResult};
pub use flatten::{flatten, unique_keys};
pub use models::{
    PlanEntry, PracticePlan, QualityTier, SegmentKey, SegmentRef, SegmentVariant,
};
