//! Comparison helpers shared by the change classifiers.
//!
//! Everything here is pure: no I/O and no hidden state.
use std::collections::BTreeSet;

/// Order-independent comparison of two optional lists.
///
/// An absent list differs from a present one, even an empty one.
pub fn set_changed(old: Option<&[String]>, new: Option<&[String]>) -> bool {
    match (old, new) {
        (None, None) => false,
        (Some(old), Some(new)) => as_set(old) != as_set(new),
        _ => true,
    }
}

/// Order-independent comparison of two optional lists, where an absent list
/// is the same as an empty one.
pub fn set_changed_or_empty(old: Option<&[String]>, new: Option<&[String]>) -> bool {
    as_set(old.unwrap_or_default()) != as_set(new.unwrap_or_default())
}

pub fn as_set(items: &[String]) -> BTreeSet<&str> {
    items.iter().map(String::as_str).collect()
}

/// Renders the difference between two configurations, if there is one.
pub fn changes<T: core::fmt::Debug + PartialEq>(old: &T, new: &T) -> Option<String> {
    if old == new {
        return None;
    }
    let cmp = pretty_assertions::Comparison::new(old, new);
    Some(
        format!("{cmp}")
            .lines()
            .map(|line| format!("  {line}"))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

/// Logs the difference between two configurations.
pub fn log_changes<T: core::fmt::Debug + PartialEq>(subject: &str, old: &T, new: &T) {
    match changes(old, new) {
        Some(change_string) => log::info!("updating {subject}:\n{change_string}"),
        None => log::info!("{subject} configuration is unchanged"),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn sets_ignore_order_and_duplicates() {
        let a = list(&["a", "b"]);
        let b = list(&["b", "a", "a"]);
        let c = list(&["a"]);
        assert!(!set_changed(Some(a.as_slice()), Some(b.as_slice())));
        assert!(!set_changed_or_empty(Some(a.as_slice()), Some(b.as_slice())));
        assert!(set_changed(Some(a.as_slice()), Some(c.as_slice())));
    }

    #[test]
    fn absence_is_a_change_unless_empty_is_allowed() {
        let empty = list(&[]);
        assert!(set_changed(None, Some(empty.as_slice())));
        assert!(!set_changed_or_empty(None, Some(empty.as_slice())));
        assert!(!set_changed(None, None));
    }
}
