// 🔁 Bulk Reconciler - all-or-nothing bulk create and bulk update
//
// Payloads arrive as loose JSON. They are validated once, here at the
// boundary, into `CreateItem` / `UpdateItem` values; the engine below only
// ever sees typed requests. Each batch runs inside a single SQLite
// transaction, so the first failing item leaves the store untouched.

use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::db::{insert_event, Event};
use crate::entities::{get_cohort_detail, get_user};
use crate::error::{json_kind, AdmissionsError, AdmissionsResult};
use crate::membership::{
    find_membership, get_membership, insert_membership, save_membership, CreatedMembership,
    EducationalStatus, FinancialStatus, Membership, MembershipPatch, NewMembership, Patch, Role,
};

// ============================================================================
// REQUEST TYPES
// ============================================================================

/// How an update item finds the membership it targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator {
    Id(i64),
    Pair { user: i64, cohort: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateItem {
    pub locator: Locator,
    pub patch: MembershipPatch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateItem {
    pub user: i64,
    pub cohort: i64,
    pub role: Role,
    pub financial_status: Option<FinancialStatus>,
    pub educational_status: Option<EducationalStatus>,
}

impl From<&CreateItem> for NewMembership {
    fn from(item: &CreateItem) -> Self {
        NewMembership {
            user_id: item.user,
            cohort_id: item.cohort,
            role: item.role,
            financial_status: item.financial_status,
            educational_status: item.educational_status,
        }
    }
}

/// A PUT body: either a batch, or one flat object addressed by user + cohort
#[derive(Debug, Clone, PartialEq)]
pub enum UpdatePayload {
    Batch(Vec<UpdateItem>),
    Single(UpdateItem),
}

impl UpdatePayload {
    pub fn is_batch(&self) -> bool {
        matches!(self, UpdatePayload::Batch(_))
    }

    /// Validate a PUT body. `path` carries (cohort_id, user_id) taken from
    /// the URL, which win over the body's `cohort`/`user` for a single object.
    pub fn from_json(value: &Value, path: (Option<i64>, Option<i64>)) -> AdmissionsResult<Self> {
        match value {
            Value::Array(items) => {
                let items = items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| UpdateItem::from_json(index, item))
                    .collect::<AdmissionsResult<Vec<_>>>()?;
                Ok(UpdatePayload::Batch(items))
            }
            Value::Object(fields) => {
                let (path_cohort, path_user) = path;
                let cohort = path_cohort.or(parse_ref(fields, 0, "cohort")?);
                let user = path_user.or(parse_ref(fields, 0, "user")?);

                let (Some(cohort), Some(user)) = (cohort, user) else {
                    return Err(AdmissionsError::MissingIdentifiers);
                };

                Ok(UpdatePayload::Single(UpdateItem {
                    locator: Locator::Pair { user, cohort },
                    patch: parse_patch(fields, 0)?,
                }))
            }
            other => Err(AdmissionsError::MalformedBatch {
                found: json_kind(other),
            }),
        }
    }
}

impl UpdateItem {
    pub fn from_json(index: usize, value: &Value) -> AdmissionsResult<Self> {
        let fields = as_object(index, value)?;

        let id = parse_ref(fields, index, "id")?;
        let user = parse_ref(fields, index, "user")?;
        let cohort = parse_ref(fields, index, "cohort")?;

        let locator = match (id, user, cohort) {
            (Some(id), _, _) => Locator::Id(id),
            (None, Some(user), Some(cohort)) => Locator::Pair { user, cohort },
            _ => return Err(AdmissionsError::CannotResolveEntity { index }),
        };

        Ok(UpdateItem {
            locator,
            patch: parse_patch(fields, index)?,
        })
    }
}

impl CreateItem {
    pub fn from_json(index: usize, value: &Value) -> AdmissionsResult<Self> {
        let fields = as_object(index, value)?;

        let (Some(user), Some(cohort)) = (
            parse_ref(fields, index, "user")?,
            parse_ref(fields, index, "cohort")?,
        ) else {
            return Err(AdmissionsError::CannotResolveEntity { index });
        };

        Ok(CreateItem {
            user,
            cohort,
            role: parse_field(fields, index, "role")?.unwrap_or_default(),
            financial_status: parse_field::<Option<FinancialStatus>>(
                fields,
                index,
                "finantial_status",
            )?
            .flatten(),
            educational_status: parse_field::<Option<EducationalStatus>>(
                fields,
                index,
                "educational_status",
            )?
            .flatten(),
        })
    }
}

/// Validate a POST body: it must be a list
pub fn parse_create_batch(value: &Value) -> AdmissionsResult<Vec<CreateItem>> {
    let Value::Array(items) = value else {
        return Err(AdmissionsError::MalformedBatch {
            found: json_kind(value),
        });
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| CreateItem::from_json(index, item))
        .collect()
}

// ============================================================================
// FIELD PARSING
// ============================================================================

fn as_object(index: usize, value: &Value) -> AdmissionsResult<&Map<String, Value>> {
    value.as_object().ok_or_else(|| AdmissionsError::InvalidField {
        index,
        field: "item".to_string(),
        reason: format!("expected an object, got {}", json_kind(value)),
    })
}

/// Identifier given as a number or a numeric string; null counts as absent
fn parse_ref(
    fields: &Map<String, Value>,
    index: usize,
    key: &str,
) -> AdmissionsResult<Option<i64>> {
    let parsed = match fields.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    };

    parsed.map(Some).ok_or_else(|| AdmissionsError::InvalidField {
        index,
        field: key.to_string(),
        reason: "expected an integer id".to_string(),
    })
}

fn parse_field<T: DeserializeOwned>(
    fields: &Map<String, Value>,
    index: usize,
    key: &str,
) -> AdmissionsResult<Option<T>> {
    fields
        .get(key)
        .map(|raw| {
            serde_json::from_value(raw.clone()).map_err(|e| AdmissionsError::InvalidField {
                index,
                field: key.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn parse_patch(fields: &Map<String, Value>, index: usize) -> AdmissionsResult<MembershipPatch> {
    fn to_patch<T>(value: Option<T>) -> Patch<T> {
        value.map(Patch::Set).unwrap_or_default()
    }

    Ok(MembershipPatch {
        role: to_patch(parse_field(fields, index, "role")?),
        financial_status: to_patch(parse_field(fields, index, "finantial_status")?),
        educational_status: to_patch(parse_field(fields, index, "educational_status")?),
    })
}

// ============================================================================
// ENGINE
// ============================================================================

fn resolve(conn: &Connection, locator: Locator) -> AdmissionsResult<Membership> {
    let found = match locator {
        Locator::Id(id) => get_membership(conn, id)?,
        Locator::Pair { user, cohort } => find_membership(conn, user, cohort)?,
    };

    found.ok_or_else(|| match locator {
        Locator::Id(id) => AdmissionsError::not_found("CohortUser", id),
        Locator::Pair { user, cohort } => {
            AdmissionsError::not_found("CohortUser", format!("user {} in cohort {}", user, cohort))
        }
    })
}

/// Apply every update in one transaction; results keep input order
pub fn update_memberships(
    conn: &mut Connection,
    items: &[UpdateItem],
    actor: &str,
) -> AdmissionsResult<Vec<Membership>> {
    let tx = conn.transaction()?;
    let mut updated = Vec::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        let mut membership = resolve(&tx, item.locator)?;
        debug!(index, id = membership.id, "resolved membership for update");

        if !item.patch.is_empty() {
            membership.apply(&item.patch);
            save_membership(&tx, &membership)?;
            insert_event(
                &tx,
                &Event::new(
                    "membership_updated",
                    "membership",
                    &membership.id.to_string(),
                    membership.snapshot(),
                    actor,
                ),
            )?;
        }

        updated.push(membership);
    }

    tx.commit()?;
    info!(count = updated.len(), "memberships updated");

    Ok(updated)
}

/// Run a validated PUT payload
pub fn apply_update_payload(
    conn: &mut Connection,
    payload: &UpdatePayload,
    actor: &str,
) -> AdmissionsResult<Vec<Membership>> {
    match payload {
        UpdatePayload::Batch(items) => update_memberships(conn, items, actor),
        UpdatePayload::Single(item) => update_memberships(conn, std::slice::from_ref(item), actor),
    }
}

/// Create every membership in one transaction; results keep input order
pub fn create_memberships(
    conn: &mut Connection,
    items: &[CreateItem],
    actor: &str,
) -> AdmissionsResult<Vec<CreatedMembership>> {
    let tx = conn.transaction()?;
    let mut created = Vec::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        let user = get_user(&tx, item.user)?
            .ok_or_else(|| AdmissionsError::not_found("User", item.user))?;
        let cohort = get_cohort_detail(&tx, item.cohort)?
            .ok_or_else(|| AdmissionsError::not_found("Cohort", item.cohort))?;

        // Pre-check inside the transaction; the UNIQUE constraint backs it up
        if find_membership(&tx, item.user, item.cohort)?.is_some() {
            return Err(AdmissionsError::DuplicateMembership {
                user: item.user,
                cohort: item.cohort,
            });
        }

        let membership = insert_membership(&tx, &NewMembership::from(item))?;
        debug!(index, id = membership.id, "membership created");

        insert_event(
            &tx,
            &Event::new(
                "membership_created",
                "membership",
                &membership.id.to_string(),
                membership.snapshot(),
                actor,
            ),
        )?;

        created.push(CreatedMembership {
            id: membership.id,
            role: membership.role,
            finantial_status: membership.financial_status,
            educational_status: membership.educational_status,
            user,
            cohort,
        });
    }

    tx.commit()?;
    info!(count = created.len(), "memberships created");

    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::get_events_for_entity;
    use crate::membership::{all_memberships, count_memberships};
    use crate::testing::*;
    use serde_json::json;

    fn update(conn: &mut Connection, body: Value) -> AdmissionsResult<Vec<Membership>> {
        let payload = UpdatePayload::from_json(&body, (None, None))?;
        apply_update_payload(conn, &payload, "test")
    }

    fn create(conn: &mut Connection, body: Value) -> AdmissionsResult<Vec<CreatedMembership>> {
        let items = parse_create_batch(&body)?;
        create_memberships(conn, &items, "test")
    }

    // ------------------------------------------------------------------------
    // boundary validation
    // ------------------------------------------------------------------------

    #[test]
    fn test_parse_update_locators() {
        let by_id = UpdateItem::from_json(0, &json!({"id": 3, "user": 1})).unwrap();
        assert_eq!(by_id.locator, Locator::Id(3));

        let by_pair = UpdateItem::from_json(0, &json!({"user": "2", "cohort": "5"})).unwrap();
        assert_eq!(by_pair.locator, Locator::Pair { user: 2, cohort: 5 });

        let err = UpdateItem::from_json(4, &json!({"user": 2})).unwrap_err();
        assert!(matches!(err, AdmissionsError::CannotResolveEntity { index: 4 }));
    }

    #[test]
    fn test_parse_patch_distinguishes_null_from_absent() {
        let item = UpdateItem::from_json(
            0,
            &json!({"id": 1, "finantial_status": null, "role": "TEACHER"}),
        )
        .unwrap();

        assert_eq!(item.patch.role, Patch::Set(Role::Teacher));
        assert_eq!(item.patch.financial_status, Patch::Set(None));
        assert_eq!(item.patch.educational_status, Patch::Unset);
    }

    #[test]
    fn test_invalid_enum_value_names_field_and_index() {
        let err = UpdateItem::from_json(2, &json!({"id": 1, "role": "potato"})).unwrap_err();

        match err {
            AdmissionsError::InvalidField { index, field, .. } => {
                assert_eq!(index, 2);
                assert_eq!(field, "role");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_non_numeric_id_rejected() {
        let err = UpdateItem::from_json(0, &json!({"id": "abc"})).unwrap_err();
        assert!(matches!(err, AdmissionsError::InvalidField { .. }));
    }

    #[test]
    fn test_top_level_shapes() {
        assert!(matches!(
            UpdatePayload::from_json(&json!("nope"), (None, None)),
            Err(AdmissionsError::MalformedBatch { found: "a string" })
        ));
        assert!(matches!(
            UpdatePayload::from_json(&json!({}), (None, None)),
            Err(AdmissionsError::MissingIdentifiers)
        ));
        assert!(matches!(
            UpdatePayload::from_json(&json!([{}]), (None, None)),
            Err(AdmissionsError::CannotResolveEntity { index: 0 })
        ));
        assert!(matches!(
            parse_create_batch(&json!({"user": 1, "cohort": 1})),
            Err(AdmissionsError::MalformedBatch { found: "an object" })
        ));
    }

    #[test]
    fn test_single_payload_prefers_path_ids() {
        let payload = UpdatePayload::from_json(
            &json!({"user": 9, "cohort": 9, "educational_status": "ACTIVE"}),
            (Some(1), Some(2)),
        )
        .unwrap();

        match payload {
            UpdatePayload::Single(item) => {
                assert_eq!(item.locator, Locator::Pair { user: 2, cohort: 1 });
                assert_eq!(
                    item.patch.educational_status,
                    Patch::Set(Some(EducationalStatus::Active))
                );
            }
            other => panic!("expected single payload, got {:?}", other),
        }
    }

    // ------------------------------------------------------------------------
    // update path
    // ------------------------------------------------------------------------

    #[test]
    fn test_empty_update_batch() {
        let mut conn = seeded_db();
        add_membership(&conn, 1, 1, Role::Student, None, None);

        assert!(update(&mut conn, json!([])).unwrap().is_empty());
        assert_eq!(count_memberships(&conn).unwrap(), 1);
    }

    #[test]
    fn test_noop_update_returns_unchanged_record() {
        let mut conn = seeded_db();
        let before = add_membership(&conn, 1, 1, Role::Teacher, Some(FinancialStatus::Late), None);

        let result = update(&mut conn, json!([{"id": before.id}])).unwrap();

        assert_eq!(result, vec![before.clone()]);
        assert_eq!(all_memberships(&conn).unwrap(), vec![before]);
        assert!(get_events_for_entity(&conn, "membership", "1").unwrap().is_empty());
    }

    #[test]
    fn test_update_two_items_by_id_and_pair() {
        let mut conn = seeded_db();
        let cohort2 = add_cohort(&conn, "cohort-2", 1);
        add_membership(&conn, 1, 1, Role::Student, None, None);
        add_membership(&conn, 2, cohort2, Role::Student, None, None);

        let result = update(
            &mut conn,
            json!([
                {"id": 1, "finantial_status": "LATE"},
                {"user": "2", "cohort": cohort2.to_string(), "educational_status": "GRADUATED"}
            ]),
        )
        .unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].financial_status, Some(FinancialStatus::Late));
        assert_eq!(result[0].educational_status, None);
        assert_eq!(result[1].id, 2);
        assert_eq!(result[1].educational_status, Some(EducationalStatus::Graduated));
        assert_eq!(result[1].financial_status, None);

        let stored = all_memberships(&conn).unwrap();
        assert_eq!(stored[0].financial_status, Some(FinancialStatus::Late));
        assert_eq!(stored[1].educational_status, Some(EducationalStatus::Graduated));

        let events = get_events_for_entity(&conn, "membership", "1").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data["finantial_status"], "LATE");
    }

    #[test]
    fn test_failed_item_rolls_back_whole_batch() {
        let mut conn = seeded_db();
        let before = add_membership(&conn, 1, 1, Role::Student, None, None);

        // second item is missing entirely from the store
        let err = update(
            &mut conn,
            json!([{"id": 1, "finantial_status": "LATE"}, {"id": 99, "role": "TEACHER"}]),
        )
        .unwrap_err();

        assert!(matches!(err, AdmissionsError::EntityNotFound { .. }));
        assert_eq!(all_memberships(&conn).unwrap(), vec![before]);
        assert!(get_events_for_entity(&conn, "membership", "1").unwrap().is_empty());
    }

    #[test]
    fn test_unresolvable_second_item_reports_its_index() {
        let mut conn = seeded_db();
        let before = add_membership(&conn, 1, 1, Role::Student, None, None);

        let err =
            update(&mut conn, json!([{"id": 1, "finantial_status": "LATE"}, {}])).unwrap_err();

        assert!(matches!(err, AdmissionsError::CannotResolveEntity { index: 1 }));
        assert_eq!(all_memberships(&conn).unwrap(), vec![before]);
    }

    #[test]
    fn test_single_update_by_pair() {
        let mut conn = seeded_db();
        add_membership(&conn, 2, 1, Role::Student, None, None);

        let payload =
            UpdatePayload::from_json(&json!({"role": "ASSISTANT"}), (Some(1), Some(2))).unwrap();
        assert!(!payload.is_batch());

        let result = apply_update_payload(&mut conn, &payload, "test").unwrap();
        assert_eq!(result[0].role, Role::Assistant);
    }

    #[test]
    fn test_single_update_by_body_ids() {
        let mut conn = seeded_db();
        add_membership(&conn, 2, 1, Role::Student, None, None);

        let payload = UpdatePayload::from_json(
            &json!({"user": 2, "cohort": "1", "role": "TEACHER"}),
            (None, None),
        )
        .unwrap();
        assert!(!payload.is_batch());

        let result = apply_update_payload(&mut conn, &payload, "test").unwrap();
        assert_eq!(result[0].user_id, 2);
        assert_eq!(result[0].role, Role::Teacher);
    }

    #[test]
    fn test_single_update_body_needs_both_ids() {
        for body in [json!({"user": 1, "role": "TEACHER"}), json!({"cohort": 1, "user": null})] {
            assert!(matches!(
                UpdatePayload::from_json(&body, (None, None)),
                Err(AdmissionsError::MissingIdentifiers)
            ));
        }
    }

    #[test]
    fn test_single_update_missing_pair_is_not_found() {
        let mut conn = seeded_db();

        let payload = UpdatePayload::from_json(&json!({}), (Some(1), Some(1))).unwrap();
        let err = apply_update_payload(&mut conn, &payload, "test").unwrap_err();

        assert!(matches!(err, AdmissionsError::EntityNotFound { .. }));
    }

    // ------------------------------------------------------------------------
    // create path
    // ------------------------------------------------------------------------

    #[test]
    fn test_empty_create_batch() {
        let mut conn = seeded_db();

        assert!(create(&mut conn, json!([])).unwrap().is_empty());
        assert_eq!(count_memberships(&conn).unwrap(), 0);
    }

    #[test]
    fn test_create_defaults_to_student_with_nested_projection() {
        let mut conn = seeded_db();

        let created = create(&mut conn, json!([{"user": 1, "cohort": 1}])).unwrap();

        assert_eq!(created.len(), 1);
        assert_eq!(created[0].id, 1);
        assert_eq!(created[0].role, Role::Student);
        assert_eq!(created[0].finantial_status, None);
        assert_eq!(created[0].educational_status, None);
        assert_eq!(created[0].user.first_name, "Ada");
        assert_eq!(created[0].cohort.slug, "cohort-1");
        assert_eq!(created[0].cohort.academy.slug, "miami");

        let stored = all_memberships(&conn).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!((stored[0].user_id, stored[0].cohort_id), (1, 1));

        let events = get_events_for_entity(&conn, "membership", "1").unwrap();
        assert_eq!(events[0].event_type, "membership_created");
        assert_eq!(events[0].actor, "test");
    }

    #[test]
    fn test_create_two_keeps_input_order() {
        let mut conn = seeded_db();

        let created = create(
            &mut conn,
            json!([
                {"user": 2, "cohort": 1, "role": "TEACHER"},
                {"user": 1, "cohort": 1, "educational_status": "ACTIVE"}
            ]),
        )
        .unwrap();

        assert_eq!(created[0].user.id, 2);
        assert_eq!(created[0].role, Role::Teacher);
        assert_eq!(created[1].user.id, 1);
        assert_eq!(created[1].educational_status, Some(EducationalStatus::Active));
    }

    #[test]
    fn test_duplicate_create_fails_and_keeps_one_row() {
        let mut conn = seeded_db();
        create(&mut conn, json!([{"user": 1, "cohort": 1}])).unwrap();

        let err = create(&mut conn, json!([{"user": 1, "cohort": 1}])).unwrap_err();

        assert!(matches!(
            err,
            AdmissionsError::DuplicateMembership { user: 1, cohort: 1 }
        ));
        assert_eq!(count_memberships(&conn).unwrap(), 1);
    }

    #[test]
    fn test_duplicate_within_batch_rolls_back() {
        let mut conn = seeded_db();

        let err = create(
            &mut conn,
            json!([{"user": 1, "cohort": 1}, {"user": 1, "cohort": 1}]),
        )
        .unwrap_err();

        assert!(matches!(err, AdmissionsError::DuplicateMembership { .. }));
        assert_eq!(count_memberships(&conn).unwrap(), 0);
    }

    #[test]
    fn test_create_requires_existing_entities() {
        let mut conn = seeded_db();

        let err = create(
            &mut conn,
            json!([{"user": 1, "cohort": 1}, {"user": 42, "cohort": 1}]),
        )
        .unwrap_err();
        assert!(matches!(err, AdmissionsError::EntityNotFound { entity: "User", .. }));

        let err = create(&mut conn, json!([{"user": 1, "cohort": 42}])).unwrap_err();
        assert!(matches!(err, AdmissionsError::EntityNotFound { entity: "Cohort", .. }));

        assert_eq!(count_memberships(&conn).unwrap(), 0);
    }

    #[test]
    fn test_create_item_without_pair() {
        let mut conn = seeded_db();

        let err = create(&mut conn, json!([{"user": 1, "cohort": 1}, {"user": 2}])).unwrap_err();

        assert!(matches!(err, AdmissionsError::CannotResolveEntity { index: 1 }));
        assert_eq!(count_memberships(&conn).unwrap(), 0);
    }
}
