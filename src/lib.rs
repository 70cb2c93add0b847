// Cohort Admissions - Core Library
// Membership store, filter engine, bulk reconciler and deleter, shared by the
// CLI, the API server, and tests

#[macro_use]
mod sql_enum;

pub mod config;
pub mod db;
pub mod delete;
pub mod entities;
pub mod error;
pub mod filter;
pub mod logging;
pub mod membership;
pub mod monitoring;
pub mod pagination;
pub mod reconcile;

#[cfg(feature = "server")]
pub mod api;

#[cfg(test)]
mod testing;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export commonly used types
pub use config::{load_dotenv, Config};
pub use db::{
    count_rows, get_events_for_entity, insert_event, load_csv, open_database, setup_database,
    Event,
};
pub use delete::{delete_memberships, DeleteSelector};
pub use entities::{
    get_academy, get_cohort, get_cohort_detail, get_user, insert_academy, insert_cohort,
    insert_user, set_cohort_stage, Academy, Cohort, CohortDetail, CohortStage, CohortSummary, User,
};
pub use error::{AdmissionsError, AdmissionsResult};
pub use filter::{MembershipCursor, MembershipFilter};
pub use logging::init_tracing;
pub use membership::{
    all_memberships, count_memberships, find_membership, get_membership, CreatedMembership,
    EducationalStatus, FinancialStatus, Membership, MembershipListing, MembershipPatch,
    MembershipUpdated, NewMembership, Patch, Role,
};
pub use monitoring::{check_active_on_ended_cohorts, run_script, ScriptReport, ScriptStatus};
pub use pagination::{Page, PageRequest};
pub use reconcile::{
    apply_update_payload, create_memberships, parse_create_batch, update_memberships, CreateItem,
    Locator, UpdateItem, UpdatePayload,
};
