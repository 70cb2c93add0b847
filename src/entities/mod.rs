// Referenced entities - academies, cohorts, users
//
// Memberships point at these by id. The engine only reads them: to resolve
// references, to filter on slugs, and to build nested projections.

pub mod academy;
pub mod cohort;
pub mod user;

pub use academy::{get_academy, insert_academy, Academy};
pub use cohort::{
    get_cohort, get_cohort_detail, insert_cohort, set_cohort_stage, Cohort, CohortDetail,
    CohortStage, CohortSummary,
};
pub use user::{get_user, insert_user, User};
