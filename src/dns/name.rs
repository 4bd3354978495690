//! Domain name helpers.
//!
//! Names are handled as absolute, lower-cased presentation strings with a
//! trailing dot (`"www.example."`, root is `"."`). Label text is kept as-is,
//! escaped presentation forms are not interpreted.

/// Normalise a name to its absolute lower-cased form.
pub fn fqdn(name: &str) -> String {
    let trimmed = name.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return ".".to_string();
    }
    format!("{}.", trimmed.to_ascii_lowercase())
}

/// Build an absolute name from wire labels (a trailing empty root label is ignored).
pub fn from_labels(labels: &[String]) -> String {
    let joined = labels
        .iter()
        .filter(|l| !l.is_empty())
        .map(|l| l.as_str())
        .collect::<Vec<_>>()
        .join(".");
    fqdn(&joined)
}

/// Split an absolute name into its labels, root yields none.
pub fn to_labels(name: &str) -> Vec<String> {
    fqdn(name)
        .split('.')
        .filter(|l| !l.is_empty())
        .map(|l| l.to_string())
        .collect()
}

/// Number of labels, not counting the root.
pub fn label_count(name: &str) -> usize {
    to_labels(name).len()
}

/// Strip the leftmost label. The parent of the root is the root.
pub fn parent(name: &str) -> String {
    let name = fqdn(name);
    match name.split_once('.') {
        Some((_, rest)) if !rest.is_empty() => fqdn(rest),
        _ => ".".to_string(),
    }
}

/// Case-insensitive name equality.
pub fn eq(a: &str, b: &str) -> bool {
    fqdn(a) == fqdn(b)
}

/// Uncompressed wire form of a name, labels kept in their given case.
pub fn to_wire(labels: &[String]) -> Vec<u8> {
    let mut out = Vec::with_capacity(labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1);
    for label in labels.iter().filter(|l| !l.is_empty()) {
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
    out
}

/// Canonical (lower-cased, uncompressed) wire form of a name.
pub fn to_canonical_wire(name: &str) -> Vec<u8> {
    to_wire(&to_labels(name))
}
