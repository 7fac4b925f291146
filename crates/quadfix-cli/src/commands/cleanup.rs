use crate::support::{Invocation, exit_with_repair_error, print_json_or_exit};
use quadfix_repair::{
    Progress, RebuildOutcome, RecoveryEngine, RepairError, remove_ghost_contexts,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct CleanupReport {
    rebuild: RebuildOutcome,
    ghost_cleanup_size: Option<u64>,
    final_size: u64,
}

pub fn run(invocation: &Invocation) {
    let mut progress = invocation.progress();
    let report =
        compact(invocation, &mut progress).unwrap_or_else(|err| exit_with_repair_error(err));

    if invocation.json {
        print_json_or_exit(&report);
    }
}

fn compact(
    invocation: &Invocation,
    progress: &mut dyn Progress,
) -> Result<CleanupReport, RepairError> {
    let rebuild = RecoveryEngine::new(&mut *progress).compact(
        &invocation.source,
        &invocation.target,
        &invocation.ordering,
    )?;

    let mut ghost_cleanup_size = None;
    if invocation.check_ghosts {
        if rebuild.size_drift() {
            progress.warning(
                "rebuilt repository differs in size from its source; garbage contexts were not removed. Validate the repository with --analyze first.",
            );
        } else {
            ghost_cleanup_size = Some(remove_ghost_contexts(
                &invocation.target,
                &invocation.ordering,
                &mut *progress,
            )?);
        }
    }

    let final_size = ghost_cleanup_size.unwrap_or(rebuild.size_new);
    progress.line(&format!("Repository cleanup finished (size: {final_size})"));
    Ok(CleanupReport {
        rebuild,
        ghost_cleanup_size,
        final_size,
    })
}
