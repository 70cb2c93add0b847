// Shared in-memory fixtures for unit tests

use rusqlite::Connection;

use crate::db::setup_database;
use crate::entities::{insert_academy, insert_cohort, insert_user, Academy, Cohort, User};
use crate::membership::{
    insert_membership, EducationalStatus, FinancialStatus, Membership, NewMembership, Role,
};

pub(crate) fn empty_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    setup_database(&conn).unwrap();
    conn
}

pub(crate) fn add_academy(conn: &Connection, slug: &str) -> i64 {
    insert_academy(conn, &Academy::new(slug, &slug.to_uppercase())).unwrap()
}

pub(crate) fn add_cohort(conn: &Connection, slug: &str, academy_id: i64) -> i64 {
    insert_cohort(conn, &Cohort::new(slug, &format!("Cohort {}", slug), academy_id)).unwrap()
}

pub(crate) fn add_user(conn: &Connection, name: &str) -> i64 {
    insert_user(
        conn,
        &User::new(name, "Tester", &format!("{}@example.com", name.to_lowercase())),
    )
    .unwrap()
}

pub(crate) fn add_membership(
    conn: &Connection,
    user_id: i64,
    cohort_id: i64,
    role: Role,
    financial_status: Option<FinancialStatus>,
    educational_status: Option<EducationalStatus>,
) -> Membership {
    insert_membership(
        conn,
        &NewMembership {
            user_id,
            cohort_id,
            role,
            financial_status,
            educational_status,
        },
    )
    .unwrap()
}

/// One academy ("miami"), one cohort ("cohort-1"), users 1 and 2, no memberships
pub(crate) fn seeded_db() -> Connection {
    let conn = empty_db();
    let academy = add_academy(&conn, "miami");
    add_cohort(&conn, "cohort-1", academy);
    add_user(&conn, "Ada");
    add_user(&conn, "Alan");
    conn
}
