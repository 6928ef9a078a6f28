//! Class handlers - create, read, update and delete stored objects.

use serde_json::{json, Map, Value};

use crate::auth::AppAuth;
use crate::error::Result;
use crate::storage::{format_date, Storage};

/// Response body for a create.
pub type CreateResponse = Map<String, Value>;

/// Create an object. The response carries the new id, the creation time and
/// the results of any non-idempotent operations.
pub fn handle_create(
    storage: &Storage,
    auth: &AppAuth,
    class_name: &str,
    body: &Map<String, Value>,
) -> Result<CreateResponse> {
    tracing::debug!(
        class_name,
        fields = body.len(),
        master = auth.master,
        "creating object"
    );

    let outcome = storage.create(class_name, body)?;

    tracing::info!(class_name, object_id = %outcome.object_id, "created object");

    let mut response = outcome.echo;
    response.insert("objectId".into(), json!(outcome.object_id));
    response.insert("createdAt".into(), json!(format_date(&outcome.created_at)));
    Ok(response)
}

/// Fetch the full wire form of an object.
pub fn handle_get(
    storage: &Storage,
    auth: &AppAuth,
    class_name: &str,
    object_id: &str,
) -> Result<Map<String, Value>> {
    tracing::debug!(
        class_name,
        object_id,
        session = auth.session_token.is_some(),
        "fetching object"
    );
    storage.get(class_name, object_id)
}

/// Apply a save body to an existing object.
pub fn handle_update(
    storage: &Storage,
    auth: &AppAuth,
    class_name: &str,
    object_id: &str,
    body: &Map<String, Value>,
) -> Result<Map<String, Value>> {
    tracing::debug!(
        class_name,
        object_id,
        fields = body.len(),
        master = auth.master,
        installation_id = ?auth.installation_id,
        "updating object"
    );

    let outcome = storage.update(class_name, object_id, body)?;

    tracing::info!(class_name, object_id, echoed = outcome.echo.len(), "updated object");

    let mut response = outcome.echo;
    response.insert("updatedAt".into(), json!(format_date(&outcome.updated_at)));
    Ok(response)
}

/// Delete an object.
pub fn handle_delete(
    storage: &Storage,
    auth: &AppAuth,
    class_name: &str,
    object_id: &str,
) -> Result<Map<String, Value>> {
    tracing::debug!(class_name, object_id, master = auth.master, "deleting object");

    storage.delete(class_name, object_id)?;

    tracing::info!(class_name, object_id, "deleted object");
    Ok(Map::new())
}
