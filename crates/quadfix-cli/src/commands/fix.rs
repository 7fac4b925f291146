use crate::support::{Invocation, exit_with_repair_error, print_json_or_exit};
use quadfix_repair::ConsistencyAnalyzer;

pub fn run(invocation: &Invocation) {
    let mut progress = invocation.progress();
    let report = ConsistencyAnalyzer::new(&mut progress)
        .analyze_and_fix(
            &invocation.source,
            &invocation.target,
            &invocation.ordering,
            invocation.check_ghosts,
        )
        .unwrap_or_else(|err| exit_with_repair_error(err));

    if invocation.json {
        print_json_or_exit(&report);
    }
}
