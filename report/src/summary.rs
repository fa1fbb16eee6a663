//! Per-run and per-segment statistics.

use std::collections::BTreeMap;
use std::path::PathBuf;

use debugloop::core::types::Role;

use crate::conversation::RunLog;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub dir: PathBuf,
    pub segment: String,
    pub success: bool,
    pub roles: BTreeMap<&'static str, usize>,
    pub functions: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentTotals {
    pub runs: usize,
    pub successes: usize,
    pub roles: BTreeMap<&'static str, usize>,
    pub functions: BTreeMap<String, usize>,
}

impl SegmentTotals {
    /// Fraction of runs that succeeded, in `[0, 1]`.
    pub fn success_rate(&self) -> f64 {
        if self.runs == 0 {
            0.0
        } else {
            self.successes as f64 / self.runs as f64
        }
    }
}

/// Count turns by role and calls by function name.
pub fn summarize_run(log: &RunLog) -> RunSummary {
    let mut roles = BTreeMap::new();
    for role in [Role::System, Role::User, Role::Assistant, Role::Tool] {
        roles.insert(role.as_str(), 0);
    }
    let mut functions = BTreeMap::new();

    for turn in &log.turns {
        *roles.entry(turn.role.as_str()).or_insert(0) += 1;
        if turn.role.is_decision() {
            for call in &turn.tool_calls {
                *functions.entry(call.function.name.clone()).or_insert(0) += 1;
            }
        }
    }

    RunSummary {
        dir: log.dir.clone(),
        segment: log.segment.clone(),
        success: log.success,
        roles,
        functions,
    }
}

pub fn group_by_segment(runs: &[RunSummary]) -> BTreeMap<String, SegmentTotals> {
    let mut groups: BTreeMap<String, SegmentTotals> = BTreeMap::new();
    for run in runs {
        let totals = groups.entry(run.segment.clone()).or_default();
        totals.runs += 1;
        if run.success {
            totals.successes += 1;
        }
        for (role, count) in &run.roles {
            *totals.roles.entry(*role).or_insert(0) += count;
        }
        for (name, count) in &run.functions {
            *totals.functions.entry(name.clone()).or_insert(0) += count;
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use debugloop::core::types::{ToolCall, Turn};

    fn log(segment: &str, success: bool, calls: &[&str]) -> RunLog {
        let mut turns = vec![Turn::system("sys"), Turn::user("stopped")];
        for (idx, name) in calls.iter().enumerate() {
            let id = format!("c{idx}");
            turns.push(Turn::assistant(None, vec![ToolCall::new(&id, *name, "{}")]));
            turns.push(Turn::tool(id, "out"));
        }
        RunLog {
            dir: PathBuf::from(format!("/runs/{segment}_x")),
            segment: segment.to_string(),
            success,
            turns,
        }
    }

    #[test]
    fn counts_roles_and_functions() {
        let summary = summarize_run(&log("CWE121", true, &["run_debugger_command", "run_debugger_command", "give_up"]));
        assert_eq!(summary.roles["system"], 1);
        assert_eq!(summary.roles["assistant"], 3);
        assert_eq!(summary.roles["tool"], 3);
        assert_eq!(summary.functions["run_debugger_command"], 2);
        assert_eq!(summary.functions["give_up"], 1);
    }

    #[test]
    fn groups_runs_with_success_rate() {
        let runs: Vec<RunSummary> = [
            log("CWE121", true, &["restart"]),
            log("CWE121", false, &["give_up"]),
            log("CWE476", true, &[]),
        ]
        .iter()
        .map(summarize_run)
        .collect();

        let groups = group_by_segment(&runs);

        let cwe121 = &groups["CWE121"];
        assert_eq!(cwe121.runs, 2);
        assert_eq!(cwe121.success_rate(), 0.5);
        assert_eq!(cwe121.functions["restart"], 1);
        assert_eq!(cwe121.roles["user"], 2);
        assert_eq!(groups["CWE476"].success_rate(), 1.0);
    }
}
