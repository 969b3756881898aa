//! Attribute mapping between local users and directory entries

use tracing::{debug, warn};

use dirbridge_core::{
    AttributeValue, DirBridgeError, DirectoryEntry, DirectoryUser, FieldAccessor, Result,
};

/// Local field that must be mapped for sync and export to work
pub const USERNAME_FIELD: &str = "username";

/// Attribute that carries the object class of exported entries
pub const OBJECT_CLASS_ATTRIBUTE: &str = "objectClass";

/// One mapped attribute
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeMappingRow<F> {
    pub directory_attribute: String,
    pub local_field: String,
    /// Setter name on the local record, e.g. `setFirstName`
    pub accessor_method: String,
    /// `local_field` resolved against the record type
    pub field: F,
}

/// Ordered attribute mapping. The first row, when there is one, always maps
/// the `username` field.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeMapping<F> {
    rows: Vec<AttributeMappingRow<F>>,
}

impl<F> Default for AttributeMapping<F> {
    fn default() -> Self {
        Self { rows: vec![] }
    }
}

impl<F> AttributeMapping<F> {
    pub fn rows(&self) -> &[AttributeMappingRow<F>] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Directory attribute holding the username
    pub fn username_attribute(&self) -> Option<&str> {
        self.rows.first().map(|row| row.directory_attribute.as_str())
    }
}

/// Build the attribute mapping for record type `U` from
/// `(local field, directory attribute)` pairs.
///
/// Pairs with a blank attribute are dropped. Without a `username` pair the
/// mapping is empty, which disables sync and export.
pub fn build_mapping<U>(raw: &[(String, String)]) -> AttributeMapping<U::Field>
where
    U: FieldAccessor,
{
    let defined: Vec<&(String, String)> = raw
        .iter()
        .filter(|(_, attribute)| !attribute.trim().is_empty())
        .collect();

    let Some(username) = defined.iter().find(|(field, _)| field == USERNAME_FIELD) else {
        warn!("User mapping has no '{}' attribute", USERNAME_FIELD);
        return AttributeMapping::default();
    };

    let rows = std::iter::once(*username)
        .chain(
            defined
                .iter()
                .copied()
                .filter(|(field, _)| field != USERNAME_FIELD),
        )
        .map(|(field, attribute)| AttributeMappingRow {
            directory_attribute: attribute.clone(),
            local_field: field.clone(),
            accessor_method: format!("set{}", capitalize(field)),
            field: U::resolve_field(field),
        })
        .collect::<Vec<_>>();

    debug!("Built attribute mapping with {} rows", rows.len());
    AttributeMapping { rows }
}

/// Build the directory entry exported for `user`
pub fn to_directory_entry<U>(
    user: &U,
    mapping: &AttributeMapping<U::Field>,
    export_object_class: &str,
) -> DirectoryEntry
where
    U: FieldAccessor,
{
    let mut entry = DirectoryEntry::new();
    entry.set(
        OBJECT_CLASS_ATTRIBUTE,
        AttributeValue::List(vec![export_object_class.to_string()]),
    );

    for row in mapping.rows() {
        let value = user.get_field(&row.field);
        entry.set(
            row.directory_attribute.clone(),
            AttributeValue::from_json(&value),
        );
    }

    entry
}

/// DN of the directory entry for `user`: the stored DN, or one built from
/// the username under the export base DN
pub fn distinguished_name<U>(user: &U, username_attribute: &str, export_base_dn: &str) -> String
where
    U: DirectoryUser,
{
    match user.dn() {
        Some(dn) if !dn.is_empty() => dn.to_string(),
        _ => format!(
            "{}={},{}",
            username_attribute,
            escape_dn_value(user.username()),
            export_base_dn
        ),
    }
}

/// Copy directory values onto `user`.
///
/// The user's password survives unchanged and the DN is taken from the
/// entry. Attributes absent from the entry leave their field untouched.
pub fn hydrate<U>(mut user: U, entry: &DirectoryEntry, mapping: &AttributeMapping<U::Field>) -> Result<U>
where
    U: DirectoryUser,
{
    let dn = entry
        .dn()
        .filter(|dn| !dn.is_empty())
        .ok_or_else(|| {
            DirBridgeError::malformed_entry(user.username(), "directory entry has no dn")
        })?
        .to_string();

    let original_password = user.password().map(str::to_owned);

    for row in mapping.rows() {
        if let Some(value) = entry.decode(&row.directory_attribute) {
            user.set_field(&row.field, value.to_json())?;
        }
    }

    user.set_password(original_password);
    user.set_dn(dn);

    Ok(user)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Escape an attribute value for use inside a DN (RFC 4514)
pub fn escape_dn_value(value: &str) -> String {
    let char_count = value.chars().count();
    let mut result = String::with_capacity(value.len());

    for (i, ch) in value.chars().enumerate() {
        let is_first = i == 0;
        let is_last = i + 1 == char_count;

        match ch {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                result.push('\\');
                result.push(ch);
            }
            '\0' => result.push_str("\\00"),
            ' ' if is_first || is_last => result.push_str("\\20"),
            '#' if is_first => result.push_str("\\23"),
            _ => result.push(ch),
        }
    }

    result
}
