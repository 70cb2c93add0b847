// 🎓 Cohort Entity - a class of students inside an academy
//
// The membership engine resolves `cohort` references here, filters on the
// cohort slug, and attaches cohort summaries/details to its projections.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::db::{parse_optional_timestamp, parse_timestamp};
use crate::entities::academy::{get_academy, Academy};
use crate::error::AdmissionsResult;

// ============================================================================
// COHORT STAGE
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CohortStage {
    #[default]
    Inactive,
    Prework,
    Started,
    FinalProject,
    Ended,
    Deleted,
}

text_enum!(CohortStage {
    Inactive => "INACTIVE",
    Prework => "PREWORK",
    Started => "STARTED",
    FinalProject => "FINAL_PROJECT",
    Ended => "ENDED",
    Deleted => "DELETED",
});

// ============================================================================
// COHORT ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cohort {
    #[serde(default)]
    pub id: i64,

    pub slug: String,
    pub name: String,
    pub academy_id: i64,

    pub kickoff_date: DateTime<Utc>,

    #[serde(default)]
    pub ending_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub never_ends: bool,

    #[serde(default)]
    pub current_day: i64,

    #[serde(default)]
    pub stage: CohortStage,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_language() -> String {
    "en".to_string()
}

impl Cohort {
    /// New, not-yet-started cohort kicking off now
    pub fn new(slug: &str, name: &str, academy_id: i64) -> Self {
        let now = Utc::now();

        Cohort {
            id: 0,
            slug: slug.to_string(),
            name: name.to_string(),
            academy_id,
            kickoff_date: now,
            ending_date: None,
            never_ends: false,
            current_day: 0,
            stage: CohortStage::Inactive,
            language: default_language(),
            created_at: now,
            updated_at: now,
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Cohort {
            id: row.get(0)?,
            slug: row.get(1)?,
            name: row.get(2)?,
            academy_id: row.get(3)?,
            kickoff_date: parse_timestamp(row.get(4)?, 4)?,
            ending_date: parse_optional_timestamp(row.get(5)?, 5)?,
            never_ends: row.get(6)?,
            current_day: row.get(7)?,
            stage: row.get(8)?,
            language: row.get(9)?,
            created_at: parse_timestamp(row.get(10)?, 10)?,
            updated_at: parse_timestamp(row.get(11)?, 11)?,
        })
    }
}

// ============================================================================
// PROJECTIONS
// ============================================================================

/// Cohort as nested inside membership listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortSummary {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub kickoff_date: DateTime<Utc>,
    pub ending_date: Option<DateTime<Utc>>,
    pub stage: CohortStage,
}

/// Cohort as nested inside freshly created memberships
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortDetail {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub never_ends: bool,
    pub kickoff_date: DateTime<Utc>,
    pub current_day: i64,
    pub academy: Academy,
    pub ending_date: Option<DateTime<Utc>>,
    pub stage: CohortStage,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CohortDetail {
    pub fn new(cohort: Cohort, academy: Academy) -> Self {
        CohortDetail {
            id: cohort.id,
            slug: cohort.slug,
            name: cohort.name,
            never_ends: cohort.never_ends,
            kickoff_date: cohort.kickoff_date,
            current_day: cohort.current_day,
            academy,
            ending_date: cohort.ending_date,
            stage: cohort.stage,
            language: cohort.language,
            created_at: cohort.created_at,
            updated_at: cohort.updated_at,
        }
    }
}

// ============================================================================
// STORAGE
// ============================================================================

const COHORT_COLUMNS: &str = "id, slug, name, academy_id, kickoff_date, ending_date, \
     never_ends, current_day, stage, language, created_at, updated_at";

pub fn insert_cohort(conn: &Connection, cohort: &Cohort) -> AdmissionsResult<i64> {
    conn.execute(
        "INSERT INTO cohorts (
            id, slug, name, academy_id, kickoff_date, ending_date,
            never_ends, current_day, stage, language, created_at, updated_at
        ) VALUES (NULLIF(?1, 0), ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            cohort.id,
            cohort.slug,
            cohort.name,
            cohort.academy_id,
            cohort.kickoff_date.to_rfc3339(),
            cohort.ending_date.map(|dt| dt.to_rfc3339()),
            cohort.never_ends,
            cohort.current_day,
            cohort.stage,
            cohort.language,
            cohort.created_at.to_rfc3339(),
            cohort.updated_at.to_rfc3339(),
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

pub fn get_cohort(conn: &Connection, id: i64) -> AdmissionsResult<Option<Cohort>> {
    let cohort = conn
        .query_row(
            &format!("SELECT {} FROM cohorts WHERE id = ?1", COHORT_COLUMNS),
            params![id],
            Cohort::from_row,
        )
        .optional()?;

    Ok(cohort)
}

/// Move a cohort to another stage (used by monitoring fixtures and the CLI seed)
pub fn set_cohort_stage(conn: &Connection, id: i64, stage: CohortStage) -> AdmissionsResult<bool> {
    let changed = conn.execute(
        "UPDATE cohorts SET stage = ?1, updated_at = ?2 WHERE id = ?3",
        params![stage, Utc::now().to_rfc3339(), id],
    )?;

    Ok(changed > 0)
}

/// Cohort plus its academy, or None when either is missing
pub fn get_cohort_detail(conn: &Connection, id: i64) -> AdmissionsResult<Option<CohortDetail>> {
    let Some(cohort) = get_cohort(conn, id)? else {
        return Ok(None);
    };
    let Some(academy) = get_academy(conn, cohort.academy_id)? else {
        return Ok(None);
    };

    Ok(Some(CohortDetail::new(cohort, academy)))
}
