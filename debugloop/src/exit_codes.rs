//! Stable exit codes for `debugloop run`.

use crate::session::LoopStop;

/// The debugged process exited with status 0 (or a non-run command succeeded).
pub const OK: i32 = 0;
/// Invalid config/layout, launch failure, or any other error.
pub const INVALID: i32 = 1;
/// The decision service gave up.
pub const GAVE_UP: i32 = 2;
/// The debugged process exited with a nonzero status.
pub const FAILED_EXIT: i32 = 3;
/// The turn limit was reached.
pub const TURN_LIMIT: i32 = 4;

pub fn for_stop(stop: &LoopStop) -> i32 {
    match stop {
        LoopStop::Exited { code: 0 } => OK,
        LoopStop::Exited { .. } => FAILED_EXIT,
        LoopStop::GaveUp => GAVE_UP,
        LoopStop::MaxTurnsExceeded { .. } => TURN_LIMIT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_stop_has_a_distinct_code() {
        let codes = [
            for_stop(&LoopStop::Exited { code: 0 }),
            for_stop(&LoopStop::Exited { code: 139 }),
            for_stop(&LoopStop::GaveUp),
            for_stop(&LoopStop::MaxTurnsExceeded { max_turns: 3 }),
        ];
        assert_eq!(codes, [OK, FAILED_EXIT, GAVE_UP, TURN_LIMIT]);
    }
}
