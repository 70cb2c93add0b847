// Shared fixtures for integration tests
#![allow(dead_code)]

use cohort_admissions::{
    insert_academy, insert_cohort, insert_user, setup_database, Academy, Cohort, CreateItem,
    EducationalStatus, FinancialStatus, Role, User,
};
use rusqlite::Connection;

/// Academies: miami (1), madrid (2)
/// Cohorts: miami-1 (1, miami), miami-2 (2, miami), madrid-1 (3, madrid)
/// Users: Ada (1), Alan (2), Grace (3)
pub fn seeded_conn() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    setup_database(&conn).unwrap();

    let miami = insert_academy(&conn, &Academy::new("miami", "Miami")).unwrap();
    let madrid = insert_academy(&conn, &Academy::new("madrid", "Madrid")).unwrap();

    insert_cohort(&conn, &Cohort::new("miami-1", "Miami One", miami)).unwrap();
    insert_cohort(&conn, &Cohort::new("miami-2", "Miami Two", miami)).unwrap();
    insert_cohort(&conn, &Cohort::new("madrid-1", "Madrid One", madrid)).unwrap();

    insert_user(&conn, &User::new("Ada", "Lovelace", "ada@example.com")).unwrap();
    insert_user(&conn, &User::new("Alan", "Turing", "alan@example.com")).unwrap();
    insert_user(&conn, &User::new("Grace", "Hopper", "grace@example.com")).unwrap();

    conn
}

pub fn item(
    user: i64,
    cohort: i64,
    role: Role,
    financial_status: Option<FinancialStatus>,
    educational_status: Option<EducationalStatus>,
) -> CreateItem {
    CreateItem {
        user,
        cohort,
        role,
        financial_status,
        educational_status,
    }
}
