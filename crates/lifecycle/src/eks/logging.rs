//! Control plane logging.
//!
//! EKS only changes the log types named in an update. Removing a type from
//! the desired configuration therefore does nothing unless the update
//! explicitly disables it, which is what [`normalize`] arranges.
use std::collections::BTreeSet;

use super::config::{LogSetup, Logging};

/// The log types a logging configuration enables.
pub fn enabled_types(logging: Option<&Logging>) -> BTreeSet<&str> {
    logging
        .map(|logging| {
            logging
                .cluster_logging
                .iter()
                .filter(|setup| setup.is_enabled())
                .flat_map(|setup| setup.types.iter().map(String::as_str))
                .collect()
        })
        .unwrap_or_default()
}

/// Rewrites the desired logging configuration as at most two setups: one
/// enabling the desired types, one disabling every type that is explicitly
/// disabled or was enabled before and is no longer desired.
pub fn normalize(old: Option<&Logging>, new: Option<&Logging>) -> Option<Logging> {
    if old.is_none() && new.is_none() {
        return None;
    }
    let enabled = enabled_types(new);
    let explicitly_disabled = new
        .into_iter()
        .flat_map(|logging| logging.cluster_logging.iter())
        .filter(|setup| !setup.is_enabled())
        .flat_map(|setup| setup.types.iter().map(String::as_str));
    let disabled: BTreeSet<&str> = enabled_types(old)
        .into_iter()
        .chain(explicitly_disabled)
        .filter(|ty| !enabled.contains(ty))
        .collect();

    let mut cluster_logging = vec![];
    if !enabled.is_empty() {
        cluster_logging.push(LogSetup {
            types: enabled.iter().map(|ty| ty.to_string()).collect(),
            enabled: Some(true),
        });
    }
    if !disabled.is_empty() {
        cluster_logging.push(LogSetup {
            types: disabled.iter().map(|ty| ty.to_string()).collect(),
            enabled: Some(false),
        });
    }
    Some(Logging { cluster_logging })
}
