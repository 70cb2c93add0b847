// 🏫 Academy Entity - owner of cohorts
//
// Academies are referenced, never mutated, by the membership engine: the
// `academy` filter matches on slug and the `Academy` header scopes requests.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::AdmissionsResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Academy {
    /// 0 until stored; the database assigns the real id
    #[serde(default)]
    pub id: i64,

    pub slug: String,
    pub name: String,

    /// ISO country code
    #[serde(default)]
    pub country: String,

    #[serde(default)]
    pub city: String,

    #[serde(default)]
    pub street_address: String,
}

impl Academy {
    pub fn new(slug: &str, name: &str) -> Self {
        Academy {
            id: 0,
            slug: slug.to_string(),
            name: name.to_string(),
            country: String::new(),
            city: String::new(),
            street_address: String::new(),
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Academy {
            id: row.get(0)?,
            slug: row.get(1)?,
            name: row.get(2)?,
            country: row.get(3)?,
            city: row.get(4)?,
            street_address: row.get(5)?,
        })
    }
}

const ACADEMY_COLUMNS: &str = "id, slug, name, country, city, street_address";

/// Store an academy, keeping its id when one is given. Returns the stored id.
pub fn insert_academy(conn: &Connection, academy: &Academy) -> AdmissionsResult<i64> {
    conn.execute(
        "INSERT INTO academies (id, slug, name, country, city, street_address)
         VALUES (NULLIF(?1, 0), ?2, ?3, ?4, ?5, ?6)",
        params![
            academy.id,
            academy.slug,
            academy.name,
            academy.country,
            academy.city,
            academy.street_address,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

pub fn get_academy(conn: &Connection, id: i64) -> AdmissionsResult<Option<Academy>> {
    let academy = conn
        .query_row(
            &format!("SELECT {} FROM academies WHERE id = ?1", ACADEMY_COLUMNS),
            params![id],
            Academy::from_row,
        )
        .optional()?;

    Ok(academy)
}
