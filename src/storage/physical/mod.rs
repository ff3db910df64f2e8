//! Physical storage backends: one JSON file per key on disk, or an ordered in-memory map.

pub mod file;
pub mod memory;

/// Immediate children of `prefix` drawn from an ordered key sequence.
pub(crate) fn children<'a>(keys: impl Iterator<Item = &'a String>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for key in keys {
        let Some(rest) = key.strip_prefix(prefix) else {
            continue;
        };

        let name = match rest.find('/') {
            Some(i) => rest[..=i].to_string(),
            None => rest.to_string(),
        };

        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }

    names.sort();
    names
}
