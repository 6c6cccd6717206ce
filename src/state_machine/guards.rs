use super::states::JobStatus;

/// Outcome of checking a requested status change against the current status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionDecision {
    /// Write the requested status
    Apply,
    /// Keep the current status; the rest of the update is still merged
    KeepCurrent,
}

/// Guard enforcing the monotonic job lifecycle.
///
/// Terminal records never move back to `STARTED` or `IN_PROGRESS`; only an
/// explicit clear resets them. Terminal to terminal is last-write-wins.
pub struct MonotonicLifecycleGuard;

impl MonotonicLifecycleGuard {
    pub fn check(current: Option<JobStatus>, requested: JobStatus) -> TransitionDecision {
        match current {
            Some(current) if current.is_terminal() && !requested.is_terminal() => {
                TransitionDecision::KeepCurrent
            }
            _ => TransitionDecision::Apply,
        }
    }
}
