//! Member-to-wire name bindings.

use std::collections::HashSet;

use super::error::{Result, WirecallError};

/// Derives a wire name from a Rust identifier.
///
/// `snake_case` becomes `lowerCamelCase`. A raw identifier prefix (`r#`) and
/// leading underscores are dropped; empty segments from doubled or trailing
/// underscores are ignored. Characters other than the first of each segment
/// keep their case, so `fetch_HTTP_status` becomes `fetchHTTPStatus`.
///
/// ```
/// use wirecall_common::protocol::derive_wire_name;
///
/// assert_eq!(derive_wire_name("user_id"), "userId");
/// assert_eq!(derive_wire_name("r#type"), "type");
/// assert_eq!(derive_wire_name("count"), "count");
/// ```
pub fn derive_wire_name(member: &str) -> String {
    let ident = member.strip_prefix("r#").unwrap_or(member);
    let mut segments = ident.split('_').filter(|s| !s.is_empty());

    let mut name = match segments.next() {
        Some(first) => first.to_string(),
        None => return ident.to_string(),
    };
    for segment in segments {
        let mut chars = segment.chars();
        if let Some(head) = chars.next() {
            name.extend(head.to_uppercase());
            name.push_str(chars.as_str());
        }
    }
    name
}

/// The wire name under which one member or argument is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterBinding {
    pub member: String,
    pub wire_name: String,
}

impl ParameterBinding {
    /// Binds `member` under its derived wire name.
    pub fn derived(member: impl Into<String>) -> Self {
        let member = member.into();
        let wire_name = derive_wire_name(&member);
        Self { member, wire_name }
    }

    /// Binds `member` under an explicit wire name.
    pub fn explicit(member: impl Into<String>, wire_name: impl Into<String>) -> Self {
        Self {
            member: member.into(),
            wire_name: wire_name.into(),
        }
    }

    /// Checks that no two bindings of one request share a wire name.
    pub fn ensure_unique(context: &str, bindings: &[ParameterBinding]) -> Result<()> {
        let mut seen = HashSet::with_capacity(bindings.len());
        for binding in bindings {
            if binding.wire_name.is_empty() {
                return Err(WirecallError::Composition(format!(
                    "{}: parameter '{}' has an empty wire name",
                    context, binding.member
                )));
            }
            if !seen.insert(binding.wire_name.as_str()) {
                return Err(WirecallError::Composition(format!(
                    "{}: wire name '{}' is used more than once",
                    context, binding.wire_name
                )));
            }
        }
        Ok(())
    }
}
