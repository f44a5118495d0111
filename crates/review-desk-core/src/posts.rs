//! File-upload metadata, groups, and member posts.
//!
//! Binary upload and encryption happen elsewhere; this module only receives
//! the already-encrypted file name and URL as opaque strings, finds the
//! group the file belongs to, and records a post visible to that group's
//! members.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::DeskError;
use crate::models::{Document, Fields};
use crate::store::{new_id, DocumentStore, FieldUpdate, Filter, Query, Write};

pub const GROUPS: &str = "groups";
pub const POSTS: &str = "posts";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRegistration {
    /// Encrypted file name.
    pub file_name: String,
    /// Plaintext original name; the group is derived from it.
    pub original_file_name: String,
    /// Encrypted retrieval URL.
    pub url: String,
    #[serde(default)]
    pub categories: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredUpload {
    pub message: String,
    pub group: String,
    pub post_id: String,
}

/// Group name encoded in an uploaded file name.
///
/// `"Report - 2024 - ACME.pdf"` → `"ACME"`: the text after the last
/// `" - "`, with `.pdf` removed.
pub fn derive_group_name(original_file_name: &str) -> String {
    let tail = original_file_name
        .rsplit(" - ")
        .next()
        .unwrap_or(original_file_name);
    tail.replacen(".pdf", "", 1)
}

/// Finds a group by id, then by membership in its `groupnames` array.
pub async fn find_group(store: &dyn DocumentStore, name: &str) -> Result<Option<Document>> {
    if let Some(group) = store.get(GROUPS, name).await? {
        return Ok(Some(group));
    }
    let q = Query::new()
        .filter(Filter::array_contains("groupnames", name))
        .limit(1);
    Ok(store.query(GROUPS, &q).await?.into_iter().next())
}

/// Records an uploaded file as a post for the matching group's members.
pub async fn register_upload(
    store: &dyn DocumentStore,
    upload: &UploadRegistration,
) -> Result<RegisteredUpload> {
    let group_name = derive_group_name(&upload.original_file_name);
    let group = find_group(store, &group_name)
        .await?
        .ok_or_else(|| DeskError::NotFound(format!("Group '{}' not found", group_name)))?;

    let members = group
        .get("members")
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));

    let mut fields = Fields::new();
    fields.insert("image".into(), Value::String(upload.file_name.clone()));
    fields.insert("downloadURL".into(), Value::String(upload.url.clone()));
    fields.insert("users".into(), members);
    fields.insert("categories".into(), upload.categories.clone());

    let post_id = new_id();
    store
        .commit(vec![
            Write::Create {
                collection: POSTS.into(),
                id: post_id.clone(),
                fields,
            },
            Write::Update {
                collection: POSTS.into(),
                id: post_id.clone(),
                updates: vec![("timestamp".into(), FieldUpdate::ServerTimestamp)],
            },
        ])
        .await?;

    tracing::info!(group = %group_name, post_id = %post_id, "upload registered");
    Ok(RegisteredUpload {
        message: "File uploaded successfully".into(),
        group: group_name,
        post_id,
    })
}

/// Posts visible to `member`.
pub async fn member_posts(store: &dyn DocumentStore, member: &str) -> Result<Vec<Document>> {
    let q = Query::new().filter(Filter::array_contains("users", member));
    store.query(POSTS, &q).await
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostSummary {
    pub file_name: Option<Value>,
    pub url: Option<Value>,
    pub image: Option<Value>,
}

/// Posts visible to `user_name` in one category.
pub async fn posts_by_category(
    store: &dyn DocumentStore,
    user_name: &str,
    categories: &Value,
) -> Result<Vec<PostSummary>> {
    let q = Query::new()
        .filter(Filter::array_contains("users", user_name))
        .filter(Filter::Eq {
            field: "categories".into(),
            value: categories.clone(),
        });
    Ok(store
        .query(POSTS, &q)
        .await?
        .into_iter()
        .map(|p| PostSummary {
            file_name: p.get("filename").cloned(),
            url: p.get("downloadURL").cloned(),
            image: p.get("image").cloned(),
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupUser {
    pub name: String,
    pub email: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub id: String,
    pub name: String,
    pub users: Vec<GroupUser>,
    pub members: Value,
    pub created: Option<String>,
}

fn str_field(v: &Value, key: &str) -> String {
    v.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Every group with its users flattened to `{name, email, id}`.
pub async fn list_groups(store: &dyn DocumentStore) -> Result<Vec<GroupSummary>> {
    let groups = store.query(GROUPS, &Query::new()).await?;
    Ok(groups
        .into_iter()
        .map(|g| {
            let users = match g.get("users") {
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|u| GroupUser {
                        name: str_field(u, "name"),
                        email: str_field(u, "email"),
                        id: str_field(u, "id"),
                    })
                    .collect(),
                _ => Vec::new(),
            };
            GroupSummary {
                name: g.id.clone(),
                members: g.get("members").cloned().unwrap_or_else(|| json!([])),
                created: g.get("created").and_then(Value::as_str).map(str::to_string),
                users,
                id: g.id,
            }
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionGrant {
    pub message: String,
    pub updated_posts: Vec<String>,
    pub updated_categories: Vec<Value>,
}

/// Adds `member` to a group and to every post its first member can see.
pub async fn grant_permission(
    store: &dyn DocumentStore,
    group_id: &str,
    member: &Value,
) -> Result<PermissionGrant> {
    let group = store
        .get(GROUPS, group_id)
        .await?
        .ok_or_else(|| DeskError::NotFound("Group not found".into()))?;
    let first_member = match group.get("members") {
        Some(Value::Array(items)) => items.first().cloned(),
        _ => None,
    }
    .ok_or_else(|| DeskError::Conflict("No members in the group".into()))?;

    let q = Query::new().filter(Filter::ArrayContains {
        field: "users".into(),
        value: first_member,
    });
    let posts = store.query(POSTS, &q).await?;

    let mut writes = vec![Write::Update {
        collection: GROUPS.into(),
        id: group_id.to_string(),
        updates: vec![(
            "members".into(),
            FieldUpdate::ArrayUnion(vec![member.clone()]),
        )],
    }];
    let mut updated_posts = Vec::with_capacity(posts.len());
    let mut updated_categories = Vec::with_capacity(posts.len());
    for post in posts {
        writes.push(Write::Update {
            collection: POSTS.into(),
            id: post.id.clone(),
            updates: vec![("users".into(), FieldUpdate::ArrayUnion(vec![member.clone()]))],
        });
        updated_categories.push(post.get("categories").cloned().unwrap_or(Value::Null));
        updated_posts.push(post.id);
    }
    store.commit(writes).await?;

    tracing::info!(group_id, posts = updated_posts.len(), "permission granted");
    Ok(PermissionGrant {
        message: "Permission added successfully".into(),
        updated_posts,
        updated_categories,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_group_name() {
        assert_eq!(derive_group_name("Statement - 2024-01 - ACME.pdf"), "ACME");
        assert_eq!(derive_group_name("ACME.pdf"), "ACME");
        assert_eq!(derive_group_name("notes - Beta"), "Beta");
        assert_eq!(derive_group_name("a - b.pdf.pdf"), "b.pdf");
    }
}
