//! Pure retry/terminal decision shared by the reconciliation cycle.

/// Outcome of one reconciliation pass over a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Every reporting group confirmed success. Terminal.
    Success,
    /// Try ceiling reached without full confirmation. Terminal.
    FailedToPublish,
    /// Still pending; `num_tries` is the value to persist for this pass.
    Retry { num_tries: i32 },
}

/// Decide what happens to a bundle after its group scan.
///
/// `count_ok` is the number of groups with at least one endpoint reporting
/// success this pass, `buffer_len` the number of groups that reported at
/// all. An empty buffer (nobody answered) never counts as success; the
/// bundle keeps accruing tries until the ceiling.
pub fn decide(count_ok: usize, buffer_len: usize, num_tries: i32, max_tries: i32) -> Decision {
    if buffer_len > 0 && count_ok == buffer_len {
        Decision::Success
    } else if num_tries >= max_tries {
        Decision::FailedToPublish
    } else {
        Decision::Retry {
            num_tries: num_tries + 1,
        }
    }
}
