//! Entity models and DTOs for the monitoring store.

pub mod activity;
pub mod flag;
pub mod trail;

pub use activity::{
    ActivityDetail, ActivityPage, ActivityQuery, ActivityRecord, CreateActivityRecord,
};
pub use flag::{CreateFlag, Flag, FlagChange, FlagPage, FlagQuery};
pub use trail::{AuditTrail, CreateAuditTrail, TrailFilters};
