// 🗑️ Bulk Deleter - selector-based, transactional removal of memberships

use rusqlite::{params_from_iter, types::Value, Connection};
use tracing::{info, warn};

use crate::db::{insert_event, Event};
use crate::error::{AdmissionsError, AdmissionsResult};
use crate::filter::split_list;
use crate::membership::{delete_memberships_by_id, Membership, MEMBERSHIP_COLUMNS};

/// Which memberships a delete request targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteSelector {
    /// Explicit membership ids
    Ids(Vec<i64>),
    /// Every (user, cohort) combination of the two sets
    Members { users: Vec<i64>, cohorts: Vec<i64> },
}

impl DeleteSelector {
    /// Build from query parameters `id`, `user`, `cohort`.
    /// `id` wins when present; otherwise both `user` and `cohort` are needed.
    pub fn from_params<'a, I>(params: I) -> AdmissionsResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut ids = None;
        let mut users = None;
        let mut cohorts = None;

        for (key, raw) in params {
            let (slot, field) = match key {
                "id" => (&mut ids, "id"),
                "user" => (&mut users, "user"),
                "cohort" => (&mut cohorts, "cohort"),
                _ => continue,
            };

            let parsed = parse_ids(field, raw)?;
            if !parsed.is_empty() {
                *slot = Some(parsed);
            }
        }

        match (ids, users, cohorts) {
            (Some(ids), _, _) => Ok(DeleteSelector::Ids(ids)),
            (None, Some(users), Some(cohorts)) => Ok(DeleteSelector::Members { users, cohorts }),
            _ => Err(AdmissionsError::SelectorRequired),
        }
    }

    /// The single membership of `user` in `cohort`
    pub fn one(cohort: i64, user: i64) -> Self {
        DeleteSelector::Members {
            users: vec![user],
            cohorts: vec![cohort],
        }
    }

    fn where_clause(&self) -> (String, Vec<Value>) {
        fn placeholders(n: usize) -> String {
            vec!["?"; n].join(", ")
        }

        match self {
            DeleteSelector::Ids(ids) => (
                format!("cu.id IN ({})", placeholders(ids.len())),
                ids.iter().copied().map(Value::Integer).collect(),
            ),
            DeleteSelector::Members { users, cohorts } => (
                format!(
                    "cu.user_id IN ({}) AND cu.cohort_id IN ({})",
                    placeholders(users.len()),
                    placeholders(cohorts.len())
                ),
                users
                    .iter()
                    .chain(cohorts.iter())
                    .copied()
                    .map(Value::Integer)
                    .collect(),
            ),
        }
    }
}

fn parse_ids(field: &'static str, raw: &str) -> AdmissionsResult<Vec<i64>> {
    split_list(raw)
        .into_iter()
        .map(|item| {
            item.parse::<i64>()
                .map_err(|_| AdmissionsError::InvalidIdentifier { field, value: item })
        })
        .collect()
}

/// Memberships a selector matches, each with its cohort's academy
fn matched(
    conn: &Connection,
    selector: &DeleteSelector,
) -> AdmissionsResult<Vec<(Membership, i64)>> {
    let (clause, values) = selector.where_clause();
    let sql = format!(
        "SELECT {}, c.academy_id
         FROM cohort_users cu
         JOIN cohorts c ON c.id = cu.cohort_id
         WHERE {}
         ORDER BY cu.id",
        MEMBERSHIP_COLUMNS, clause
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), |row| {
            Ok((Membership::from_row(row)?, row.get::<_, i64>(7)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Remove every membership the selector matches, in one transaction.
///
/// With `academy_scope`, a match outside that academy aborts the whole
/// request with `AccessDenied` and nothing is removed.
pub fn delete_memberships(
    conn: &mut Connection,
    selector: &DeleteSelector,
    academy_scope: Option<i64>,
    actor: &str,
) -> AdmissionsResult<usize> {
    let tx = conn.transaction()?;
    let targets = matched(&tx, selector)?;

    if let Some(academy) = academy_scope {
        if let Some((outsider, _)) = targets.iter().find(|(_, owner)| *owner != academy) {
            warn!(membership = outsider.id, academy, "delete outside academy scope rejected");
            return Err(AdmissionsError::AccessDenied {
                membership: outsider.id,
                academy,
            });
        }
    }

    let ids: Vec<i64> = targets.iter().map(|(m, _)| m.id).collect();
    let removed = delete_memberships_by_id(&tx, &ids)?;

    for (membership, _) in &targets {
        insert_event(
            &tx,
            &Event::new(
                "membership_deleted",
                "membership",
                &membership.id.to_string(),
                membership.snapshot(),
                actor,
            ),
        )?;
    }

    tx.commit()?;
    info!(removed, "memberships deleted");

    Ok(removed)
}
