// 👤 User Entity - the person behind a membership

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::AdmissionsResult;

/// Also the user summary nested in membership projections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: i64,

    #[serde(default)]
    pub first_name: String,

    #[serde(default)]
    pub last_name: String,

    pub email: String,
}

impl User {
    pub fn new(first_name: &str, last_name: &str, email: &str) -> Self {
        User {
            id: 0,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
        }
    }
}

pub fn insert_user(conn: &Connection, user: &User) -> AdmissionsResult<i64> {
    conn.execute(
        "INSERT INTO users (id, first_name, last_name, email)
         VALUES (NULLIF(?1, 0), ?2, ?3, ?4)",
        params![user.id, user.first_name, user.last_name, user.email],
    )?;

    Ok(conn.last_insert_rowid())
}

pub fn get_user(conn: &Connection, id: i64) -> AdmissionsResult<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, first_name, last_name, email FROM users WHERE id = ?1",
            params![id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    first_name: row.get(1)?,
                    last_name: row.get(2)?,
                    email: row.get(3)?,
                })
            },
        )
        .optional()?;

    Ok(user)
}
