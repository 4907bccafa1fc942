//! Report rendering for the terminal.

use owo_colors::OwoColorize;

use calsinki_core::report::{ExecutionPhase, PurgeReport, SyncReport};

pub fn print_sync_report(report: &SyncReport) {
    if report.dry_run {
        println!("\n🔍 DRY RUN: rule {}", report.rule_id);
    } else {
        println!("\n🔄 Rule: {}", report.rule_id);
    }

    if report.loop_exclusions > 0 {
        println!(
            "  ⏭️  {} event(s) excluded by loop prevention",
            report.loop_exclusions.to_string().yellow()
        );
    }

    for target in &report.targets {
        if let ExecutionPhase::Failed { error } = &target.phase {
            println!("  ❌ {}: {}", target.target_name, error.red());
            continue;
        }

        let counts = &target.counts;
        println!(
            "  📅 {}: {} created, {} updated, {} deleted, {} skipped",
            target.target_name,
            counts.created.to_string().green(),
            counts.updated.to_string().cyan(),
            counts.deleted.to_string().red(),
            counts.skipped
        );
        if counts.failed > 0 {
            println!("     {} mutation(s) failed", counts.failed.to_string().red());
        }

        for anomaly in &target.anomalies {
            println!("     ⚠️  {:?}: {}", anomaly.kind, anomaly.detail.yellow());
        }

        for planned in &target.planned {
            println!("     • {}", planned);
        }
    }

    let totals = report.totals();
    if report.dry_run {
        println!(
            "  Would apply {} change(s) across {} destination(s)",
            totals.changes(),
            report.targets.len()
        );
    }
}

pub fn print_purge_report(report: &PurgeReport) {
    if report.dry_run {
        println!("\n🔍 DRY RUN: purge {}", report.scope);
    } else {
        println!("\n🧹 Purge: {}", report.scope);
    }

    for target in &report.targets {
        if let ExecutionPhase::Failed { error } = &target.phase {
            println!("  ❌ {}: {}", target.target_name, error.red());
            continue;
        }

        println!(
            "  📅 {}: {} deleted",
            target.target_name,
            target.deleted.to_string().red()
        );
        if target.instances_collapsed > 0 {
            println!(
                "     {} series instance(s) covered by their master",
                target.instances_collapsed
            );
        }
        if target.failed > 0 {
            println!("     {} deletion(s) failed", target.failed.to_string().red());
        }
        for planned in &target.planned {
            println!("     • {}", planned);
        }
    }

    if report.dry_run {
        println!("  Would delete {} event(s)", report.total_deleted());
    } else {
        println!("  Deleted {} event(s)", report.total_deleted());
    }
}
