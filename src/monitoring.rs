// 🩺 Monitoring Scripts - scheduled health checks over an academy's memberships
//
// A script inspects the store and answers with a `ScriptReport`. OPERATIONAL
// means nothing to report; MINOR carries a human-readable notification text.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::entities::get_academy;
use crate::error::{AdmissionsError, AdmissionsResult};

// ============================================================================
// SCRIPT REPORT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScriptStatus {
    Operational,
    Minor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptReport {
    pub script_slug: String,
    pub status: ScriptStatus,
    pub severity_level: u8,
    pub text: String,
}

impl ScriptReport {
    fn operational(slug: &str, text: &str) -> Self {
        ScriptReport {
            script_slug: slug.to_string(),
            status: ScriptStatus::Operational,
            severity_level: 5,
            text: text.to_string(),
        }
    }

    fn minor(slug: &str, text: String) -> Self {
        ScriptReport {
            script_slug: slug.to_string(),
            status: ScriptStatus::Minor,
            severity_level: 5,
            text,
        }
    }

    pub fn is_operational(&self) -> bool {
        self.status == ScriptStatus::Operational
    }
}

// ============================================================================
// SCRIPTS
// ============================================================================

pub const ACTIVE_ON_ENDED: &str = "check_cohort_user_status_ended_cohort";

pub type Script = fn(&Connection, i64) -> AdmissionsResult<ScriptReport>;

/// Every script `run_script` knows, by slug
pub const SCRIPTS: &[(&str, Script)] =
    &[(ACTIVE_ON_ENDED, check_active_on_ended_cohorts as Script)];

/// Memberships still ACTIVE on cohorts of `academy_id` that have ENDED
pub fn check_active_on_ended_cohorts(
    conn: &Connection,
    academy_id: i64,
) -> AdmissionsResult<ScriptReport> {
    let mut stmt = conn.prepare(
        "SELECT u.first_name, u.last_name, u.email, c.name
         FROM cohort_users cu
         JOIN cohorts c ON c.id = cu.cohort_id
         JOIN users u ON u.id = cu.user_id
         WHERE c.stage = 'ENDED'
           AND cu.educational_status = 'ACTIVE'
           AND c.academy_id = ?1
         ORDER BY cu.id",
    )?;

    let offenders = stmt
        .query_map(params![academy_id], |row| {
            Ok(format!(
                "- {} {} ({}) => {}",
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    if offenders.is_empty() {
        return Ok(ScriptReport::operational(ACTIVE_ON_ENDED, "Everything up to date"));
    }

    warn!(academy_id, count = offenders.len(), "active memberships on ended cohorts");

    Ok(ScriptReport::minor(
        ACTIVE_ON_ENDED,
        format!(
            "This users: {} are active on ended cohorts",
            offenders.join("\n")
        ),
    ))
}

/// Run a script by slug against one academy
pub fn run_script(
    conn: &Connection,
    slug: &str,
    academy_id: i64,
) -> AdmissionsResult<ScriptReport> {
    if get_academy(conn, academy_id)?.is_none() {
        return Err(AdmissionsError::not_found("Academy", academy_id));
    }

    let Some((_, script)) = SCRIPTS.iter().find(|(name, _)| *name == slug) else {
        return Err(AdmissionsError::not_found("MonitorScript", slug));
    };
    let report = script(conn, academy_id)?;

    info!(script = slug, academy_id, status = ?report.status, "monitoring script finished");

    Ok(report)
}
