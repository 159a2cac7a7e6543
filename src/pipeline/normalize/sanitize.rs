//! Mapping of arbitrary label names onto safe, unique column identifiers.

use std::collections::{BTreeMap, HashMap, HashSet};

/// Sanitize a single label name.
///
/// `__name__` becomes `metric_name`. Otherwise leading and trailing
/// underscores are stripped, every character outside `[A-Za-z0-9_]` becomes
/// `_`, an empty result becomes `label` and a leading digit gets a `label_`
/// prefix. Underscores produced by the replacement at either edge are stripped
/// too, so sanitizing a sanitized name returns it unchanged.
pub fn sanitize_label(label: &str) -> String {
    if label == "__name__" {
        return "metric_name".to_string();
    }

    let replaced: String = label
        .trim_matches('_')
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    let sanitized = replaced.trim_matches('_');

    if sanitized.is_empty() {
        return "label".to_string();
    }
    if sanitized.starts_with(|c: char| c.is_ascii_digit()) {
        return format!("label_{sanitized}");
    }
    sanitized.to_string()
}

/// Sanitize a set of label names into unique column names.
///
/// Names are assigned walking the labels in sorted order. The first label
/// producing a given name keeps it; later collisions get `_1`, `_2`, ...
/// skipping any suffix that is already taken. The result is keyed by the
/// original label.
pub fn sanitize_labels<'a, I>(labels: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = &'a str>,
{
    sanitize_labels_reserving(labels, &[])
}

/// Like [`sanitize_labels`], but `reserved` names count as taken before any
/// label is assigned, so a label that sanitizes to one of them is suffixed.
pub fn sanitize_labels_reserving<'a, I>(labels: I, reserved: &[&str]) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = &'a str>,
{
    let sorted: Vec<&str> = {
        let mut v: Vec<&str> = labels.into_iter().collect();
        v.sort_unstable();
        v.dedup();
        v
    };

    let mut assigned: HashSet<String> = reserved.iter().map(|r| r.to_string()).collect();
    let mut collisions: HashMap<String, usize> = HashMap::new();
    let mut out = BTreeMap::new();

    for label in sorted {
        let base = sanitize_label(label);
        let name = if assigned.contains(&base) {
            let counter = collisions.entry(base.clone()).or_insert(0);
            loop {
                *counter += 1;
                let candidate = format!("{base}_{counter}");
                if !assigned.contains(&candidate) {
                    break candidate;
                }
            }
        } else {
            base
        };
        assigned.insert(name.clone());
        out.insert(label.to_string(), name);
    }

    out
}
