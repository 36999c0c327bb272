//! Distinguished name helpers.
//!
//! DNs are handled as strings in their RFC 4514 form. These helpers cover the
//! small amount of structure the engine needs: escaping values, splitting off
//! the leading RDN and comparing names without regard to case or spacing.

use crate::error::{DirectoryError, DirectoryResult};

/// Escape special characters in DN attribute values per RFC 4514.
///
/// Characters that must be escaped:
/// - Leading or trailing SPACE (escaped as \20)
/// - Leading # (escaped as \23)
/// - Characters: , + " \ < > ; = (escaped with backslash prefix)
/// - NUL character (escaped as \00)
pub fn escape_dn_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len() * 2);
    let last = value.chars().count().saturating_sub(1);

    for (i, ch) in value.chars().enumerate() {
        let is_first = i == 0;
        let is_last = i == last;

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

/// Build a single `attr=value` component, escaping the value.
pub fn rdn(attribute: &str, value: &str) -> DirectoryResult<String> {
    if value.is_empty() {
        return Err(DirectoryError::invalid_dn(
            format!("{attribute}="),
            "naming attribute value is empty",
        ));
    }
    Ok(format!("{}={}", attribute, escape_dn_value(value)))
}

/// Prepend `rdn` to `parent`.
pub fn child_dn(rdn: &str, parent: &str) -> String {
    if parent.is_empty() {
        rdn.to_string()
    } else {
        format!("{rdn},{parent}")
    }
}

/// Convert a dotted domain to its `dc=` suffix (`a.b.c` → `dc=a,dc=b,dc=c`).
pub fn domain_to_suffix(domain: &str) -> DirectoryResult<String> {
    let domain = domain.trim();
    if domain.is_empty() {
        return Err(DirectoryError::invalid_dn(domain, "domain is empty"));
    }

    let labels = domain
        .split('.')
        .map(|label| {
            if label.is_empty() {
                Err(DirectoryError::invalid_dn(
                    domain,
                    "domain contains an empty label",
                ))
            } else {
                Ok(format!("dc={}", escape_dn_value(label)))
            }
        })
        .collect::<DirectoryResult<Vec<_>>>()?;

    Ok(labels.join(","))
}

/// Split a DN into its RDN components, honouring backslash escapes.
pub fn split_rdns(dn: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (i, ch) in dn.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            ',' => {
                parts.push(dn[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let tail = dn[start..].trim();
    if !tail.is_empty() || !parts.is_empty() {
        parts.push(tail);
    }

    parts
}

/// The DN of the entry directly above `dn`, or `None` for a single RDN.
pub fn parent_dn(dn: &str) -> Option<String> {
    let rdns = split_rdns(dn);
    if rdns.len() < 2 {
        return None;
    }
    Some(rdns[1..].join(","))
}

/// Attribute type and raw (still escaped) value of the leading RDN.
pub fn leading_rdn(dn: &str) -> DirectoryResult<(String, String)> {
    let first = split_rdns(dn)
        .into_iter()
        .next()
        .ok_or_else(|| DirectoryError::invalid_dn(dn, "empty distinguished name"))?;

    let (attribute, value) = first
        .split_once('=')
        .ok_or_else(|| DirectoryError::invalid_dn(dn, "leading RDN has no '='"))?;

    let attribute = attribute.trim();
    if attribute.is_empty() {
        return Err(DirectoryError::invalid_dn(dn, "leading RDN has no attribute"));
    }
    Ok((attribute.to_string(), value.trim().to_string()))
}

/// Reverse [`escape_dn_value`] for backslash and `\XX` hex escapes.
pub fn unescape_dn_value(value: &str) -> String {
    let mut out = Vec::with_capacity(value.len());
    let bytes = value.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() {
            let hex = bytes
                .get(i + 1..i + 3)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok());
            match hex {
                Some(byte) => {
                    out.push(byte);
                    i += 3;
                }
                None => {
                    out.push(bytes[i + 1]);
                    i += 2;
                }
            }
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Canonical form used for comparisons: attribute types and values
/// lowercased, whitespace around separators removed.
pub fn normalize(dn: &str) -> String {
    split_rdns(dn)
        .into_iter()
        .map(|rdn| match rdn.split_once('=') {
            Some((attr, value)) => {
                format!("{}={}", attr.trim().to_lowercase(), value.trim().to_lowercase())
            }
            None => rdn.to_lowercase(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Whether two DNs name the same entry.
pub fn same_dn(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// Whether `dn` sits strictly below `ancestor`.
pub fn is_descendant_of(dn: &str, ancestor: &str) -> bool {
    let dn = normalize(dn);
    let ancestor = normalize(ancestor);
    dn.len() > ancestor.len() && dn.ends_with(&format!(",{ancestor}"))
}

/// Number of RDN components.
pub fn depth(dn: &str) -> usize {
    split_rdns(dn).len()
}
