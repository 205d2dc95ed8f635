//! Retry policies for polling loops.

use std::time::Duration;

pub use ::backoff::future::retry_notify;
pub use ::backoff::Error as BackoffError;
pub use ::backoff::ExponentialBackoff;

use crate::error::OpsError;

/// Policy for polling a condition expected to become true within `deadline`.
pub fn polling_policy(deadline: Duration) -> ExponentialBackoff {
    polling_policy_with_max(Duration::from_millis(250), Duration::from_secs(5), deadline)
}

pub fn polling_policy_with_max(
    initial_interval: Duration,
    max_interval: Duration,
    deadline: Duration,
) -> ExponentialBackoff {
    ExponentialBackoff {
        current_interval: initial_interval,
        initial_interval,
        multiplier: 2.0,
        max_interval,
        max_elapsed_time: Some(deadline),
        ..ExponentialBackoff::default()
    }
}

/// Classifies an error for a retry loop. Access denied and invalid
/// parameters abort immediately, everything else is retried until the
/// deadline.
pub fn classify(error: OpsError) -> BackoffError<OpsError> {
    match error {
        OpsError::AccessDenied { .. } | OpsError::BadParameter { .. } => {
            BackoffError::permanent(error)
        }
        error => BackoffError::transient(error),
    }
}
