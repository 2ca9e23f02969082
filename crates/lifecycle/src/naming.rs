//! Physical names for resources created without an explicit name.

/// Maximum length of an EKS cluster name.
pub const MAX_CLUSTER_NAME_LEN: usize = 100;

/// Maximum length of a Redshift table identifier.
pub const MAX_TABLE_NAME_LEN: usize = 127;

/// Number of trailing stack id characters used as a table name suffix.
pub const STACK_SUFFIX_LEN: usize = 12;

/// Joins a human readable prefix and a unique suffix into a name of at most
/// `max_len` characters.
///
/// The suffix is always kept whole and the prefix keeps as many of its
/// leading characters as fit. A suffix that cannot fit on its own is cut to
/// its last `max_len` characters.
pub fn physical_name(prefix: &str, separator: &str, suffix: &str, max_len: usize) -> String {
    let suffix_len = suffix.chars().count();
    if suffix_len >= max_len {
        return suffix.chars().skip(suffix_len - max_len).collect();
    }
    let room = max_len - suffix_len;
    let separator_len = separator.chars().count();
    if room <= separator_len {
        return suffix.to_owned();
    }
    let prefix: String = prefix.chars().take(room - separator_len).collect();
    if prefix.is_empty() {
        return suffix.to_owned();
    }
    format!("{prefix}{separator}{suffix}")
}

/// Name of a cluster created without an explicit name.
///
/// The logical id makes the name readable, the request id (32 hex digits once
/// its dashes are removed) makes it unique.
pub fn cluster_name(logical_resource_id: &str, request_id: &str) -> String {
    let suffix = request_id.replace('-', "");
    physical_name(logical_resource_id, "-", &suffix, MAX_CLUSTER_NAME_LEN)
}

/// The last [`STACK_SUFFIX_LEN`] characters of a stack id.
///
/// Stack ids end in a UUID, so this is stable for the life of the stack and
/// distinct between stacks.
pub fn stack_suffix(stack_id: &str) -> String {
    let len = stack_id.chars().count();
    stack_id
        .chars()
        .skip(len.saturating_sub(STACK_SUFFIX_LEN))
        .collect()
}
