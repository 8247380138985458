//! Case conversion between configuration names and vendor API names
//!
//! Configuration uses snake_case (e.g., `security_group_id`)
//! The vendor API uses CamelCase (e.g., `SecurityGroupId`)
//!
//! Collections are sent as indexed parameters: `SecurityGroupId.1`, `SecurityGroupId.2`, ...

/// Convert snake_case to CamelCase (PascalCase)
/// e.g., "security_group_id" -> "SecurityGroupId"
pub fn to_camel_case(s: &str) -> String {
    s.split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                None => String::new(),
                Some(first) => first.to_uppercase().chain(chars).collect(),
            }
        })
        .collect()
}

/// Convert CamelCase to snake_case
/// e.g., "SecurityGroupId" -> "security_group_id"
///
/// Every uppercase letter starts a new word, so acronyms split per letter
/// (`"VIP"` -> `"v_i_p"`). Fields like that carry an explicit vendor name.
pub fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.extend(c.to_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}

/// Indexed parameter name, 1-based
/// e.g., ("Ip", 1) -> "Ip.1"
pub fn indexed_key(base: &str, index: usize) -> String {
    format!("{}.{}", base, index)
}

/// Parameter name of a field inside an indexed block
/// e.g., ("BondAttribute", 2, "Mode") -> "BondAttribute.2.Mode"
pub fn nested_key(base: &str, index: usize, field: &str) -> String {
    format!("{}.{}.{}", base, index, field)
}
