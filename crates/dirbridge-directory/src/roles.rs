//! Derivation of local roles from directory role entries

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use dirbridge_core::{DirectoryEntry, DirectoryUser, Result, RoleId, RoleReferenceLookup};

use crate::settings::RawRoleMapping;

/// Directory role name to the local roles it grants
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleMapping {
    entries: BTreeMap<String, BTreeSet<RoleId>>,
}

impl RoleMapping {
    pub fn get(&self, directory_role: &str) -> Option<&BTreeSet<RoleId>> {
        self.entries.get(directory_role)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Build the role mapping. Rows naming the same directory role are merged.
pub fn build_role_mapping_table(raw: &[RawRoleMapping]) -> RoleMapping {
    let mut entries: BTreeMap<String, BTreeSet<RoleId>> = BTreeMap::new();
    for row in raw {
        entries
            .entry(row.directory_role_name.clone())
            .or_default()
            .extend(row.local_role_ids.iter().cloned());
    }
    RoleMapping { entries }
}

/// Role identifiers carried by a role entry under `role_id_attribute`
pub fn resolve_directory_role_values(
    entry: &DirectoryEntry,
    role_id_attribute: &str,
) -> Vec<String> {
    entry
        .decode(role_id_attribute)
        .map(|value| value.into_values())
        .unwrap_or_default()
        .into_iter()
        .filter(|value| !value.is_empty())
        .collect()
}

/// Local roles granted by a set of directory roles. Directory roles without
/// a mapping grant nothing.
pub fn map_to_local_roles(directory_roles: &[String], mapping: &RoleMapping) -> BTreeSet<RoleId> {
    directory_roles
        .iter()
        .filter_map(|role| mapping.get(role))
        .flatten()
        .cloned()
        .collect()
}

/// Attach the given roles to `user` as deferred references
pub fn apply_roles<U>(
    user: &mut U,
    local_role_ids: &BTreeSet<RoleId>,
    lookup: &dyn RoleReferenceLookup,
) -> Result<()>
where
    U: DirectoryUser,
{
    if local_role_ids.is_empty() {
        return Ok(());
    }

    let references = local_role_ids
        .iter()
        .map(|id| lookup.reference(id))
        .collect::<Result<Vec<_>>>()?;

    debug!(
        "Assigning {} roles to {}",
        references.len(),
        user.username()
    );

    for role in references {
        user.add_role(role);
    }
    Ok(())
}

/// Filter that finds the role entries referencing `user_dn`: the configured
/// role filter AND-ed with an equality clause on the membership attribute
pub fn role_search_filter(role_filter: &str, role_user_id_attribute: &str, user_dn: &str) -> String {
    let role_filter = role_filter.trim();
    let role_clause = if role_filter.starts_with('(') && role_filter.ends_with(')') {
        role_filter.to_string()
    } else {
        format!("({})", role_filter)
    };

    format!(
        "(&{}({}={}))",
        role_clause,
        role_user_id_attribute,
        escape_filter_value(user_dn)
    )
}

/// Escape special characters in a filter assertion value (RFC 4515)
pub fn escape_filter_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_search_filter() {
        assert_eq!(
            role_search_filter("objectClass=groupOfNames", "member", "uid=jdoe,dc=example"),
            "(&(objectClass=groupOfNames)(member=uid=jdoe,dc=example))"
        );
        assert_eq!(
            role_search_filter("(objectClass=group)", "member", "cn=x"),
            "(&(objectClass=group)(member=cn=x))"
        );
    }

    #[test]
    fn test_filter_value_escaping() {
        assert_eq!(escape_filter_value("cn=a(b)*"), "cn=a\\28b\\29\\2a");
    }
}
