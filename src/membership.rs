// 🧑‍🎓 Membership Store - who belongs to which cohort, and how
//
// A membership (a "cohort user") ties one user to one cohort with a role and
// two independent statuses. (user_id, cohort_id) is a natural key enforced by
// a UNIQUE constraint on `cohort_users`.

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::db::parse_timestamp;
use crate::entities::{CohortDetail, CohortSummary, User};
use crate::error::{AdmissionsError, AdmissionsResult};

// ============================================================================
// ENUMERATIONS
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    #[default]
    Student,
    Assistant,
    Teacher,
}

text_enum!(Role {
    Student => "STUDENT",
    Assistant => "ASSISTANT",
    Teacher => "TEACHER",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinancialStatus {
    FullyPaid,
    UpToDate,
    Late,
}

text_enum!(FinancialStatus {
    FullyPaid => "FULLY_PAID",
    UpToDate => "UP_TO_DATE",
    Late => "LATE",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EducationalStatus {
    Active,
    Postponed,
    Suspended,
    Graduated,
    Dropped,
}

text_enum!(EducationalStatus {
    Active => "ACTIVE",
    Postponed => "POSTPONED",
    Suspended => "SUSPENDED",
    Graduated => "GRADUATED",
    Dropped => "DROPPED",
});

// ============================================================================
// MEMBERSHIP
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub id: i64,
    pub user_id: i64,
    pub cohort_id: i64,
    pub role: Role,

    #[serde(rename = "finantial_status")]
    pub financial_status: Option<FinancialStatus>,

    pub educational_status: Option<EducationalStatus>,

    /// Set once on insert
    pub created_at: DateTime<Utc>,
}

impl Membership {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Membership {
            id: row.get(0)?,
            user_id: row.get(1)?,
            cohort_id: row.get(2)?,
            role: row.get(3)?,
            financial_status: row.get(4)?,
            educational_status: row.get(5)?,
            created_at: parse_timestamp(row.get(6)?, 6)?,
        })
    }

    /// Apply only the fields the patch sets
    pub fn apply(&mut self, patch: &MembershipPatch) {
        patch.role.apply_to(&mut self.role);
        patch.financial_status.apply_to(&mut self.financial_status);
        patch.educational_status.apply_to(&mut self.educational_status);
    }

    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "user_id": self.user_id,
            "cohort_id": self.cohort_id,
            "role": self.role,
            "finantial_status": self.financial_status,
            "educational_status": self.educational_status,
        })
    }
}

/// Values for a membership that does not exist yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewMembership {
    pub user_id: i64,
    pub cohort_id: i64,
    pub role: Role,
    pub financial_status: Option<FinancialStatus>,
    pub educational_status: Option<EducationalStatus>,
}

impl NewMembership {
    pub fn student(user_id: i64, cohort_id: i64) -> Self {
        NewMembership {
            user_id,
            cohort_id,
            role: Role::Student,
            financial_status: None,
            educational_status: None,
        }
    }
}

// ============================================================================
// PATCHES
// ============================================================================

/// One updatable field: left alone, or overwritten with a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Patch<T> {
    Unset,
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Unset
    }
}

impl<T: Clone> Patch<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Patch::Set(_))
    }

    pub fn apply_to(&self, target: &mut T) {
        if let Patch::Set(value) = self {
            *target = value.clone();
        }
    }
}

/// Nullable statuses use `Set(None)` to clear the stored value
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MembershipPatch {
    pub role: Patch<Role>,
    pub financial_status: Patch<Option<FinancialStatus>>,
    pub educational_status: Patch<Option<EducationalStatus>>,
}

impl MembershipPatch {
    pub fn is_empty(&self) -> bool {
        !self.role.is_set() && !self.financial_status.is_set() && !self.educational_status.is_set()
    }
}

// ============================================================================
// PROJECTIONS
// ============================================================================

/// Shape returned by bulk updates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipUpdated {
    pub id: i64,
    pub role: Role,
    pub educational_status: Option<EducationalStatus>,
    pub finantial_status: Option<FinancialStatus>,
}

impl From<Membership> for MembershipUpdated {
    fn from(membership: Membership) -> Self {
        MembershipUpdated {
            id: membership.id,
            role: membership.role,
            educational_status: membership.educational_status,
            finantial_status: membership.financial_status,
        }
    }
}

/// Shape returned by listings (filter engine)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipListing {
    pub id: i64,
    pub role: Role,
    pub finantial_status: Option<FinancialStatus>,
    pub educational_status: Option<EducationalStatus>,
    pub created_at: DateTime<Utc>,
    pub cohort: CohortSummary,
    pub user: User,
}

/// Shape returned by bulk creates, with nested user and cohort detail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedMembership {
    pub id: i64,
    pub role: Role,
    pub finantial_status: Option<FinancialStatus>,
    pub educational_status: Option<EducationalStatus>,
    pub user: User,
    pub cohort: CohortDetail,
}

// ============================================================================
// STORAGE
// ============================================================================

pub(crate) const MEMBERSHIP_COLUMNS: &str = "cu.id, cu.user_id, cu.cohort_id, cu.role, \
     cu.financial_status, cu.educational_status, cu.created_at";

pub fn get_membership(conn: &Connection, id: i64) -> AdmissionsResult<Option<Membership>> {
    let membership = conn
        .query_row(
            &format!("SELECT {} FROM cohort_users cu WHERE cu.id = ?1", MEMBERSHIP_COLUMNS),
            params![id],
            Membership::from_row,
        )
        .optional()?;

    Ok(membership)
}

/// Look up by natural key
pub fn find_membership(
    conn: &Connection,
    user_id: i64,
    cohort_id: i64,
) -> AdmissionsResult<Option<Membership>> {
    let membership = conn
        .query_row(
            &format!(
                "SELECT {} FROM cohort_users cu WHERE cu.user_id = ?1 AND cu.cohort_id = ?2",
                MEMBERSHIP_COLUMNS
            ),
            params![user_id, cohort_id],
            Membership::from_row,
        )
        .optional()?;

    Ok(membership)
}

/// Insert a membership; a natural-key collision becomes `DuplicateMembership`
pub fn insert_membership(conn: &Connection, new: &NewMembership) -> AdmissionsResult<Membership> {
    let created_at = Utc::now();

    let result = conn.execute(
        "INSERT INTO cohort_users (
            user_id, cohort_id, role, financial_status, educational_status, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            new.user_id,
            new.cohort_id,
            new.role,
            new.financial_status,
            new.educational_status,
            created_at.to_rfc3339(),
        ],
    );

    match result {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            return Err(AdmissionsError::DuplicateMembership {
                user: new.user_id,
                cohort: new.cohort_id,
            });
        }
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
        {
            return Err(AdmissionsError::not_found(
                "User or Cohort",
                format!("user {} / cohort {}", new.user_id, new.cohort_id),
            ));
        }
        Err(e) => return Err(e.into()),
    }

    Ok(Membership {
        id: conn.last_insert_rowid(),
        user_id: new.user_id,
        cohort_id: new.cohort_id,
        role: new.role,
        financial_status: new.financial_status,
        educational_status: new.educational_status,
        created_at,
    })
}

/// Persist the mutable fields (role and statuses) of an existing membership
pub fn save_membership(conn: &Connection, membership: &Membership) -> AdmissionsResult<()> {
    let changed = conn.execute(
        "UPDATE cohort_users
         SET role = ?1, financial_status = ?2, educational_status = ?3
         WHERE id = ?4",
        params![
            membership.role,
            membership.financial_status,
            membership.educational_status,
            membership.id,
        ],
    )?;

    if changed == 0 {
        return Err(AdmissionsError::not_found("CohortUser", membership.id));
    }

    Ok(())
}

pub fn delete_memberships_by_id(conn: &Connection, ids: &[i64]) -> AdmissionsResult<usize> {
    if ids.is_empty() {
        return Ok(0);
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let removed = conn.execute(
        &format!("DELETE FROM cohort_users WHERE id IN ({})", placeholders),
        params_from_iter(ids.iter()),
    )?;

    Ok(removed)
}

pub fn count_memberships(conn: &Connection) -> AdmissionsResult<i64> {
    crate::db::count_rows(conn, "cohort_users")
}

/// Every membership, ascending by id
pub fn all_memberships(conn: &Connection) -> AdmissionsResult<Vec<Membership>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM cohort_users cu ORDER BY cu.id",
        MEMBERSHIP_COLUMNS
    ))?;

    let memberships = stmt
        .query_map([], Membership::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(memberships)
}
