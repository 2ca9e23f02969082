//! Completion polling.
//!
//! A completion check looks at the remote resource exactly once and turns
//! what it sees into a [`Progress`]. Statuses that mean "still working" are
//! never errors, only terminal failures are.
use snafu::prelude::*;

use crate::{RemoteFailureSnafu, Result, UnknownStatusSnafu};

/// What an observed remote status means for the operation being polled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Progress {
    InProgress,
    Succeeded,
    /// Terminal failure, with whatever explanation the service gave.
    Failed { detail: Option<String> },
    /// A status this handler does not know how to interpret.
    Unknown,
}

/// A remote observation that can be interpreted as [`Progress`].
pub trait Observed {
    /// Raw status as reported by the service.
    fn status(&self) -> &str;

    fn progress(&self) -> Progress;
}

/// Interprets a single observation of `subject` identified by `id`.
///
/// Returns `Ok(true)` once the operation succeeded and `Ok(false)` while it
/// is still running.
///
/// ## Errors
/// Errs if the operation failed or reports a status that is not understood.
pub fn check(subject: &'static str, id: &str, observed: &impl Observed) -> Result<bool> {
    let status = observed.status();
    match observed.progress() {
        Progress::Succeeded => {
            log::info!("{subject} '{id}' is {status}");
            Ok(true)
        }
        Progress::InProgress => {
            log::info!("{subject} '{id}' is {status}, not complete yet");
            Ok(false)
        }
        Progress::Failed { detail } => RemoteFailureSnafu {
            subject,
            id,
            status,
            detail,
        }
        .fail(),
        Progress::Unknown => UnknownStatusSnafu {
            subject,
            id,
            status,
        }
        .fail(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Error;

    struct Seen(&'static str, Progress);

    impl Observed for Seen {
        fn status(&self) -> &str {
            self.0
        }

        fn progress(&self) -> Progress {
            self.1.clone()
        }
    }

    #[test]
    fn in_progress_is_not_an_error() {
        assert!(!check("op", "1", &Seen("RUNNING", Progress::InProgress)).unwrap());
        assert!(check("op", "1", &Seen("DONE", Progress::Succeeded)).unwrap());
    }

    #[test]
    fn failure_carries_the_remote_detail() {
        let err = check(
            "op",
            "1",
            &Seen(
                "FAILED",
                Progress::Failed {
                    detail: Some("disk full".into()),
                },
            ),
        )
        .unwrap_err();
        assert!(matches!(err, Error::RemoteFailure { .. }));
        assert_eq!("op '1' is in a FAILED status: disk full", err.to_string());
    }

    #[test]
    fn failure_without_detail_does_not_invent_one() {
        let err = check("op", "1", &Seen("FAILED", Progress::Failed { detail: None })).unwrap_err();
        assert_eq!("op '1' is in a FAILED status", err.to_string());
    }

    #[test]
    fn unknown_status_is_an_error() {
        let err = check("op", "1", &Seen("WEIRD", Progress::Unknown)).unwrap_err();
        assert!(matches!(err, Error::UnknownStatus { .. }));
    }
}
