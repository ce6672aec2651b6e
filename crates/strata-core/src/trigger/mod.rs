//! Automatic promotion trigger and query usage tracking.

mod auto;
mod tracker;

pub use auto::{
    AutomaticPromotionTrigger, Eligibility, LayerScan, ScanReport, TriggerConfig, TriggerOutcome,
    TRIGGER_ACTIONS,
};
pub use tracker::QueryTracker;
