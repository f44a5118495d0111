//! Organization onboarding and user records.
//!
//! Only the document-store side lives here. Creating identity-provider
//! accounts and issuing credentials is out of scope; user ids are
//! generated locally.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::DeskError;
use crate::models::{format_timestamp, Document, Fields};
use crate::store::{new_id, Cursor, DocumentStore, FieldUpdate, Filter, Query, Write};

pub const USERS: &str = "users";
pub const ORGANIZATIONS: &str = "organizations";

/// Default page size of a user search.
pub const DEFAULT_SEARCH_LIMIT: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipRole {
    Owner,
    Admin,
    Member,
}

fn membership(user_id: &str, role: MembershipRole) -> Value {
    json!({ "user": format!("{}/{}", USERS, user_id), "role": role })
}

fn keyed(key: &str, value: Value) -> Value {
    let mut map = Fields::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}

fn object(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMember {
    /// Caller-chosen user name.
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMember {
    pub group_id: String,
    pub new_member: NewMember,
}

/// Registers a member: user record, organization membership, group entry.
///
/// All three writes commit together. Returns the new user id.
pub async fn add_member(store: &dyn DocumentStore, req: &AddMember) -> Result<String> {
    if req.group_id.trim().is_empty() {
        return Err(DeskError::InvalidPayload("`groupId` is required".into()).into());
    }
    if req.new_member.email.trim().is_empty() {
        return Err(DeskError::InvalidPayload("`newMember.email` is required".into()).into());
    }

    let uid = new_id();
    let member = &req.new_member;
    let now = format_timestamp(store.now());

    let writes = vec![
        Write::Set {
            collection: ORGANIZATIONS.into(),
            id: req.group_id.clone(),
            fields: object(json!({
                "members": keyed(&uid, membership(&uid, MembershipRole::Member)),
            })),
            merge: true,
        },
        Write::Set {
            collection: USERS.into(),
            id: uid.clone(),
            fields: object(json!({
                "name": member.name,
                "email": member.email,
                "userName": member.id,
                "createdAt": now,
                "onboarded": true,
            })),
            merge: false,
        },
        Write::Update {
            collection: crate::posts::GROUPS.into(),
            id: req.group_id.clone(),
            updates: vec![(
                "users".into(),
                FieldUpdate::ArrayUnion(vec![json!({
                    "id": uid,
                    "name": member.name,
                    "email": member.email,
                })]),
            )],
        },
    ];
    store.commit(writes).await?;

    tracing::info!(group_id = %req.group_id, user_id = %uid, "member added");
    Ok(uid)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Onboarding {
    pub user_id: String,
    pub organization_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub contact_number: String,
    #[serde(default)]
    pub spouse: String,
    #[serde(default)]
    pub dependants: String,
    #[serde(default)]
    pub service_member: bool,
}

/// Creates an organization owned by the user, plus the user's record.
///
/// Returns the new organization id.
pub async fn complete_onboarding(store: &dyn DocumentStore, req: &Onboarding) -> Result<String> {
    if req.user_id.trim().is_empty() {
        return Err(DeskError::InvalidPayload("`userId` is required".into()).into());
    }
    if req.organization_name.trim().is_empty() {
        return Err(DeskError::InvalidPayload("`organizationName` is required".into()).into());
    }

    let org_id = new_id();
    let org = object(json!({
        "name": req.organization_name,
        "lastName": req.last_name,
        "members": keyed(&req.user_id, membership(&req.user_id, MembershipRole::Owner)),
        "email": req.email,
        "spouse": req.spouse,
        "contactnumber": req.contact_number,
        "dependants": req.dependants,
        "serviceMember": req.service_member,
    }));

    store
        .commit(vec![
            Write::Create {
                collection: ORGANIZATIONS.into(),
                id: org_id.clone(),
                fields: org,
            },
            Write::Set {
                collection: USERS.into(),
                id: req.user_id.clone(),
                fields: Fields::new(),
                merge: false,
            },
        ])
        .await?;

    tracing::info!(user_id = %req.user_id, organization_id = %org_id, "onboarding completed");
    Ok(org_id)
}

/// Profile fields a user update may touch.
pub const UPDATABLE_USER_FIELDS: [&str; 10] = [
    "created", "email", "fullName", "lang", "lastName", "name", "phone", "photo", "role",
    "userName",
];

/// Merges the provided profile fields into a user record.
///
/// Unknown keys are ignored; absent keys are left untouched. Returns the
/// names of the fields written.
pub async fn update_user(
    store: &dyn DocumentStore,
    user_id: &str,
    body: &Value,
) -> Result<Vec<String>> {
    let body = body
        .as_object()
        .ok_or_else(|| DeskError::InvalidPayload("body must be an object".into()))?;
    let mut fields = Fields::new();
    for key in UPDATABLE_USER_FIELDS {
        if let Some(v) = body.get(key) {
            fields.insert(key.to_string(), v.clone());
        }
    }
    let written: Vec<String> = fields.keys().cloned().collect();
    store.set(USERS, user_id, fields, true).await?;
    tracing::info!(user_id, fields = ?written, "user updated");
    Ok(written)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSearch {
    pub query: String,
    /// `"true"`, `"false"`, or empty for either.
    pub active: String,
    pub reference: String,
    pub start_after: String,
    pub limit: Option<usize>,
}

/// Pages through users ordered by `Name`, then keeps name-prefix matches.
pub async fn search_users(store: &dyn DocumentStore, search: &UserSearch) -> Result<Vec<Document>> {
    let mut q = Query::new();
    if !search.active.is_empty() {
        q = q.filter(Filter::eq("Active", search.active == "true"));
    }
    if !search.reference.is_empty() {
        q = q.filter(Filter::eq("reference", search.reference.as_str()));
    }
    q = q.order_by("Name");
    if !search.start_after.is_empty() {
        if let Some(last) = store.get(USERS, &search.start_after).await? {
            q = q.start_after(Cursor::after(&last, Some("Name")));
        }
    }
    q = q.limit(search.limit.unwrap_or(DEFAULT_SEARCH_LIMIT));

    let mut users = store.query(USERS, &q).await?;
    if !search.query.is_empty() {
        users.retain(|u| {
            u.get("Name")
                .and_then(Value::as_str)
                .is_some_and(|n| n.starts_with(search.query.as_str()))
        });
    }
    Ok(users)
}
