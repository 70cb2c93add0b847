// 🔎 Filter Engine - comma-separated, multi-field membership filtering
//
// Every recognised parameter accepts one value or a comma-separated set.
// Values within one parameter are OR-ed; distinct parameters are AND-ed.
// Values that match nothing (unknown enum text, missing slug, an empty
// value) just exclude rows, they never reject the request.

use std::collections::VecDeque;

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use tracing::debug;

use crate::db::{parse_optional_timestamp, parse_timestamp};
use crate::entities::{CohortSummary, User};
use crate::error::AdmissionsResult;
use crate::membership::{Membership, MembershipListing, MEMBERSHIP_COLUMNS};

const FROM_JOINED: &str = "FROM cohort_users cu
     JOIN cohorts c ON c.id = cu.cohort_id
     JOIN academies a ON a.id = c.academy_id
     JOIN users u ON u.id = cu.user_id";

const LISTING_COLUMNS: &str = "c.id, c.slug, c.name, c.kickoff_date, c.ending_date, c.stage, \
     u.id, u.first_name, u.last_name, u.email";

/// Split a raw parameter on commas, dropping blanks left by stray commas
pub(crate) fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MembershipFilter {
    roles: Option<Vec<String>>,
    financial_statuses: Option<Vec<String>>,
    educational_statuses: Option<Vec<String>>,
    academies: Option<Vec<String>>,
    cohorts: Option<Vec<String>>,
    academy_scope: Option<i64>,
}

impl MembershipFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from query parameters; unrecognised names are ignored
    pub fn from_params<'a, I>(params: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut filter = Self::new();
        for (name, raw) in params {
            filter.set(name, raw);
        }
        filter
    }

    /// Add the values of one named parameter. Returns false for unknown names.
    pub fn set(&mut self, name: &str, raw: &str) -> bool {
        let slot = match name {
            "roles" => &mut self.roles,
            "finantial_status" => &mut self.financial_statuses,
            "educational_status" => &mut self.educational_statuses,
            "academy" => &mut self.academies,
            "cohorts" => &mut self.cohorts,
            _ => return false,
        };

        // `?roles=` is a constraint that nothing satisfies
        slot.get_or_insert_with(Vec::new).extend(split_list(raw));
        true
    }

    /// Restrict results to cohorts owned by one academy
    pub fn with_academy_scope(mut self, academy_id: i64) -> Self {
        self.academy_scope = Some(academy_id);
        self
    }

    pub fn is_unconstrained(&self) -> bool {
        *self == Self::default()
    }

    fn where_clause(&self) -> (Vec<String>, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        let dimensions = [
            ("cu.role", &self.roles),
            ("cu.financial_status", &self.financial_statuses),
            ("cu.educational_status", &self.educational_statuses),
            ("a.slug", &self.academies),
            ("c.slug", &self.cohorts),
        ];

        for (column, accepted) in dimensions {
            if let Some(accepted) = accepted {
                if accepted.is_empty() {
                    clauses.push("0".to_string());
                    continue;
                }
                let placeholders = vec!["?"; accepted.len()].join(", ");
                clauses.push(format!("{} IN ({})", column, placeholders));
                values.extend(accepted.iter().cloned().map(Value::Text));
            }
        }

        if let Some(academy_id) = self.academy_scope {
            clauses.push("c.academy_id = ?".to_string());
            values.push(Value::Integer(academy_id));
        }

        (clauses, values)
    }

    fn select<T, F>(
        &self,
        conn: &Connection,
        columns: &str,
        after_id: Option<i64>,
        window: Option<(usize, usize)>,
        map: F,
    ) -> AdmissionsResult<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let (mut clauses, mut values) = self.where_clause();

        if let Some(after_id) = after_id {
            clauses.push("cu.id > ?".to_string());
            values.push(Value::Integer(after_id));
        }

        let mut sql = format!("SELECT {} {}", columns, FROM_JOINED);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY cu.id");

        if let Some((limit, offset)) = window {
            sql.push_str(" LIMIT ? OFFSET ?");
            values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
            values.push(Value::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));
        }

        debug!(%sql, "filtering memberships");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), map)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// All matching memberships, ascending by id
    pub fn fetch(&self, conn: &Connection) -> AdmissionsResult<Vec<Membership>> {
        self.select(conn, MEMBERSHIP_COLUMNS, None, None, Membership::from_row)
    }

    /// All matching memberships with cohort and user summaries attached
    pub fn fetch_listings(&self, conn: &Connection) -> AdmissionsResult<Vec<MembershipListing>> {
        let columns = format!("{}, {}", MEMBERSHIP_COLUMNS, LISTING_COLUMNS);
        self.select(conn, &columns, None, None, listing_from_row)
    }

    /// One page of listings
    pub fn fetch_page(
        &self,
        conn: &Connection,
        limit: usize,
        offset: usize,
    ) -> AdmissionsResult<Vec<MembershipListing>> {
        let columns = format!("{}, {}", MEMBERSHIP_COLUMNS, LISTING_COLUMNS);
        self.select(conn, &columns, None, Some((limit, offset)), listing_from_row)
    }

    pub fn count(&self, conn: &Connection) -> AdmissionsResult<usize> {
        let counts = self.select(conn, "COUNT(*)", None, None, |row| row.get::<_, i64>(0))?;
        Ok(counts.first().copied().unwrap_or(0) as usize)
    }

    /// Lazy scan in id order, `chunk` rows per query. Restart by calling again.
    pub fn scan<'c>(&self, conn: &'c Connection, chunk: usize) -> MembershipCursor<'c> {
        MembershipCursor {
            conn,
            filter: self.clone(),
            chunk: chunk.max(1),
            last_id: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }
}

fn listing_from_row(row: &Row<'_>) -> rusqlite::Result<MembershipListing> {
    let membership = Membership::from_row(row)?;

    Ok(MembershipListing {
        id: membership.id,
        role: membership.role,
        finantial_status: membership.financial_status,
        educational_status: membership.educational_status,
        created_at: membership.created_at,
        cohort: CohortSummary {
            id: row.get(7)?,
            slug: row.get(8)?,
            name: row.get(9)?,
            kickoff_date: parse_timestamp(row.get(10)?, 10)?,
            ending_date: parse_optional_timestamp(row.get(11)?, 11)?,
            stage: row.get(12)?,
        },
        user: User {
            id: row.get(13)?,
            first_name: row.get(14)?,
            last_name: row.get(15)?,
            email: row.get(16)?,
        },
    })
}

/// Keyset cursor over a filter; each refill asks for ids after the last seen
pub struct MembershipCursor<'c> {
    conn: &'c Connection,
    filter: MembershipFilter,
    chunk: usize,
    last_id: Option<i64>,
    buffer: VecDeque<Membership>,
    exhausted: bool,
}

impl Iterator for MembershipCursor<'_> {
    type Item = AdmissionsResult<Membership>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            let fetched = self.filter.select(
                self.conn,
                MEMBERSHIP_COLUMNS,
                self.last_id,
                Some((self.chunk, 0)),
                Membership::from_row,
            );

            match fetched {
                Ok(rows) => {
                    if rows.len() < self.chunk {
                        self.exhausted = true;
                    }
                    if let Some(last) = rows.last() {
                        self.last_id = Some(last.id);
                    }
                    self.buffer.extend(rows);
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }

        self.buffer.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::{EducationalStatus, FinancialStatus, Role};
    use crate::testing::*;
    use std::collections::BTreeSet;

    fn ids(memberships: &[Membership]) -> BTreeSet<i64> {
        memberships.iter().map(|m| m.id).collect()
    }

    fn filter(pairs: &[(&str, &str)]) -> MembershipFilter {
        MembershipFilter::from_params(pairs.iter().copied())
    }

    /// Two academies, three cohorts, memberships with mixed roles and statuses
    fn mixed_db() -> Connection {
        let conn = empty_db();
        let miami = add_academy(&conn, "miami");
        let madrid = add_academy(&conn, "madrid");
        let c1 = add_cohort(&conn, "miami-1", miami);
        let c2 = add_cohort(&conn, "miami-2", miami);
        let c3 = add_cohort(&conn, "madrid-1", madrid);
        let users: Vec<i64> = ["A", "B", "C", "D"].iter().map(|n| add_user(&conn, n)).collect();

        use EducationalStatus::*;
        use FinancialStatus::*;
        add_membership(&conn, users[0], c1, Role::Student, Some(Late), Some(Active));
        add_membership(&conn, users[1], c1, Role::Teacher, None, None);
        add_membership(&conn, users[2], c2, Role::Student, Some(FullyPaid), Some(Graduated));
        add_membership(&conn, users[3], c3, Role::Assistant, Some(Late), Some(Dropped));
        add_membership(&conn, users[0], c3, Role::Student, Some(UpToDate), Some(Active));
        conn
    }

    #[test]
    fn test_no_params_returns_everything_in_id_order() {
        let conn = mixed_db();

        let all = MembershipFilter::new().fetch(&conn).unwrap();
        let order: Vec<i64> = all.iter().map(|m| m.id).collect();

        assert_eq!(order, vec![1, 2, 3, 4, 5]);
        assert!(MembershipFilter::new().is_unconstrained());
    }

    #[test]
    fn test_roles_with_comma_keeps_only_matching_role() {
        let conn = seeded_db();
        add_membership(&conn, 1, 1, Role::Student, None, None);
        add_membership(&conn, 2, 1, Role::Assistant, None, None);

        let found = filter(&[("roles", "STUDENT,TEACHER")]).fetch(&conn).unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].role, Role::Student);
    }

    #[test]
    fn test_unknown_values_yield_nothing() {
        let conn = mixed_db();

        for (name, value) in [
            ("roles", "they-killed-kenny"),
            ("finantial_status", "they-killed-kenny"),
            ("educational_status", "they-killed-kenny"),
            ("academy", "they-killed-kenny"),
            ("cohorts", "they-killed-kenny"),
        ] {
            let found = filter(&[(name, value)]).fetch(&conn).unwrap();
            assert!(found.is_empty(), "{}={} should match nothing", name, value);
        }
    }

    #[test]
    fn test_role_match_is_case_sensitive() {
        let conn = mixed_db();
        assert!(filter(&[("roles", "student")]).fetch(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_values_within_parameter_are_unioned() {
        let conn = mixed_db();

        let late = ids(&filter(&[("finantial_status", "LATE")]).fetch(&conn).unwrap());
        let paid = ids(&filter(&[("finantial_status", "FULLY_PAID")]).fetch(&conn).unwrap());
        let both = ids(&filter(&[("finantial_status", "LATE,FULLY_PAID")]).fetch(&conn).unwrap());

        let union: BTreeSet<i64> = late.union(&paid).copied().collect();
        assert_eq!(both, union);
        assert_eq!(both.len(), 3);
    }

    #[test]
    fn test_parameters_are_intersected() {
        let conn = mixed_db();

        let by_role = ids(&filter(&[("roles", "STUDENT")]).fetch(&conn).unwrap());
        let by_status = ids(&filter(&[("educational_status", "ACTIVE")]).fetch(&conn).unwrap());
        let combined = ids(
            &filter(&[("roles", "STUDENT"), ("educational_status", "ACTIVE")])
                .fetch(&conn)
                .unwrap(),
        );
        let reversed = ids(
            &filter(&[("educational_status", "ACTIVE"), ("roles", "STUDENT")])
                .fetch(&conn)
                .unwrap(),
        );

        let intersection: BTreeSet<i64> = by_role.intersection(&by_status).copied().collect();
        assert_eq!(combined, intersection);
        assert_eq!(combined, reversed);
        assert_eq!(combined, BTreeSet::from([1, 5]));
    }

    #[test]
    fn test_academy_and_cohort_slugs() {
        let conn = mixed_db();

        let madrid = ids(&filter(&[("academy", "madrid")]).fetch(&conn).unwrap());
        assert_eq!(madrid, BTreeSet::from([4, 5]));

        let cohorts = ids(&filter(&[("cohorts", "miami-2,madrid-1,nope")]).fetch(&conn).unwrap());
        assert_eq!(cohorts, BTreeSet::from([3, 4, 5]));

        let with_comma =
            ids(&filter(&[("academy", "miami,they-killed-kenny")]).fetch(&conn).unwrap());
        assert_eq!(with_comma, BTreeSet::from([1, 2, 3]));
    }

    #[test]
    fn test_stray_commas_are_ignored() {
        let conn = mixed_db();
        assert_eq!(filter(&[("roles", ",TEACHER,")]).fetch(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_value_matches_nothing() {
        let conn = mixed_db();

        for name in ["roles", "finantial_status", "educational_status", "academy", "cohorts"] {
            let empty = filter(&[(name, "")]);
            assert!(!empty.is_unconstrained());
            assert!(empty.fetch(&conn).unwrap().is_empty(), "{}= should match nothing", name);
            assert_eq!(empty.count(&conn).unwrap(), 0);
        }

        // a later non-empty value for the same parameter still applies
        assert_eq!(filter(&[("roles", ""), ("roles", "TEACHER")]).fetch(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_parameter_names_are_ignored() {
        let mut f = MembershipFilter::new();
        assert!(!f.set("limit", "10"));
        assert!(f.set("roles", "STUDENT"));
        assert!(!f.is_unconstrained());
    }

    #[test]
    fn test_academy_scope() {
        let conn = mixed_db();

        let scoped = MembershipFilter::new().with_academy_scope(2);
        assert_eq!(ids(&scoped.fetch(&conn).unwrap()), BTreeSet::from([4, 5]));

        let scoped_students = filter(&[("roles", "STUDENT")]).with_academy_scope(1);
        assert_eq!(ids(&scoped_students.fetch(&conn).unwrap()), BTreeSet::from([1, 3]));
    }

    #[test]
    fn test_listings_carry_cohort_and_user() {
        let conn = mixed_db();

        let listings = filter(&[("cohorts", "madrid-1")]).fetch_listings(&conn).unwrap();

        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].cohort.slug, "madrid-1");
        assert_eq!(listings[0].user.first_name, "D");
        assert_eq!(listings[1].user.email, "a@example.com");
        assert_eq!(listings[0].finantial_status, Some(FinancialStatus::Late));
    }

    #[test]
    fn test_page_and_count() {
        let conn = mixed_db();
        let all = MembershipFilter::new();

        assert_eq!(all.count(&conn).unwrap(), 5);
        assert_eq!(filter(&[("roles", "TEACHER")]).count(&conn).unwrap(), 1);

        let page = all.fetch_page(&conn, 2, 2).unwrap();
        let page_ids: Vec<i64> = page.iter().map(|l| l.id).collect();
        assert_eq!(page_ids, vec![3, 4]);

        assert!(all.fetch_page(&conn, 2, 10).unwrap().is_empty());
        assert!(all.fetch_page(&conn, usize::MAX, usize::MAX).unwrap().is_empty());
    }

    #[test]
    fn test_scan_walks_all_chunks_and_restarts() {
        let conn = mixed_db();
        let all = MembershipFilter::new();

        let scanned: Vec<i64> = all
            .scan(&conn, 2)
            .map(|m| m.unwrap().id)
            .collect();
        assert_eq!(scanned, vec![1, 2, 3, 4, 5]);

        let again: Vec<i64> = all.scan(&conn, 2).take(2).map(|m| m.unwrap().id).collect();
        assert_eq!(again, vec![1, 2]);

        let students: Vec<i64> = filter(&[("roles", "STUDENT")])
            .scan(&conn, 1)
            .map(|m| m.unwrap().id)
            .collect();
        assert_eq!(students, vec![1, 3, 5]);
    }

    #[test]
    fn test_scan_sees_rows_added_after_start() {
        let conn = seeded_db();
        add_membership(&conn, 1, 1, Role::Student, None, None);

        let mut cursor = MembershipFilter::new().scan(&conn, 1);
        assert_eq!(cursor.next().unwrap().unwrap().id, 1);

        add_membership(&conn, 2, 1, Role::Teacher, None, None);
        assert_eq!(cursor.next().unwrap().unwrap().id, 2);
        assert!(cursor.next().is_none());
    }
}
