use std::collections::BTreeSet;

use crate::api::{ApiPermission, ApiSpace};
use crate::model::{Space, SpaceAccess};

const LOGGED_IN_GROUP: &str = "confluence-users";
const ADMINISTRATORS: &str = "administrators";

/// App users that hold admin rights on every space and only add noise.
pub const BORING_ADMINS: [&str; 5] = [
    "Chat Notifications",
    "Copy Space for Confluence",
    "Jira Ops Confluence integration",
    "Lucidchart Diagrams Connector",
    "Microsoft Teams for Confluence Cloud",
];

pub fn space_from_api(space: ApiSpace) -> Space {
    let access = access_from_permissions(&space.permissions);
    Space::new(space.key, space.name, access)
}

pub fn access_from_permissions(permissions: &[ApiPermission]) -> SpaceAccess {
    SpaceAccess {
        anonymous_read: permissions.iter().any(is_anonymous_read),
        logged_in_read: permissions.iter().any(is_logged_in_read),
        admins: admins(permissions),
    }
}

fn grants(permission: &ApiPermission, operation: &str) -> bool {
    permission
        .operation
        .as_ref()
        .is_some_and(|op| op.operation == operation && op.target_type == "space")
}

fn is_anonymous_read(permission: &ApiPermission) -> bool {
    grants(permission, "read") && permission.anonymous_access
}

fn is_logged_in_read(permission: &ApiPermission) -> bool {
    grants(permission, "read")
        && permission
            .subjects
            .as_ref()
            .and_then(|subjects| subjects.group.as_ref())
            .is_some_and(|groups| {
                groups
                    .results
                    .iter()
                    .any(|group| group.name == LOGGED_IN_GROUP)
            })
}

/// Who the permission is granted to.
fn grantee(permission: &ApiPermission) -> Option<String> {
    if permission.anonymous_access {
        return Some("anonymous".to_string());
    }
    let subjects = permission.subjects.as_ref()?;
    if let Some(group) = subjects
        .group
        .as_ref()
        .and_then(|groups| groups.results.first())
    {
        return Some(group.name.clone());
    }
    subjects
        .user
        .as_ref()
        .and_then(|users| users.results.first())
        .map(|user| user.name().to_string())
}

/// Sorted admin names, `administrators` first, apps and add-ons removed.
fn admins(permissions: &[ApiPermission]) -> Vec<String> {
    let names: BTreeSet<String> = permissions
        .iter()
        .filter(|permission| grants(permission, "administer"))
        .filter_map(grantee)
        .filter(|name| !name.starts_with("addon_"))
        .filter(|name| !BORING_ADMINS.contains(&name.as_str()))
        .collect();

    let mut sorted: Vec<String> = names.into_iter().collect();
    sorted.sort_by(|a, b| (a != ADMINISTRATORS, a).cmp(&(b != ADMINISTRATORS, b)));
    sorted
}
