use colored::Colorize;

use crate::engine::LifecycleEvent;
use crate::state::models::ResourceIdentity;

/// Per-resource console progress, suppressed by the scope's quiet flag.
/// Only addresses and events are printed here, never snapshot contents, so
/// secrets cannot leak through this path.

fn verbs(event: LifecycleEvent) -> (&'static str, &'static str) {
    match event {
        LifecycleEvent::Create => ("Creating", "Creation"),
        LifecycleEvent::Update => ("Updating", "Update"),
        LifecycleEvent::Delete => ("Destroying", "Destruction"),
    }
}

pub(crate) fn started(identity: &ResourceIdentity, event: LifecycleEvent, quiet: bool) {
    if quiet {
        return;
    }
    let (progress, _) = verbs(event);
    println!("{}: {}...", identity.address(), progress.cyan());
}

pub(crate) fn still_running(identity: &ResourceIdentity, event: LifecycleEvent, elapsed_secs: u64) {
    let (progress, _) = verbs(event);
    println!(
        "{}: Still {}... [{} elapsed]",
        identity.address(),
        progress.to_lowercase().cyan(),
        format_duration(elapsed_secs).bold(),
    );
}

pub(crate) fn completed(
    identity: &ResourceIdentity,
    event: LifecycleEvent,
    elapsed_secs: u64,
    quiet: bool,
) {
    if quiet {
        return;
    }
    let (_, past) = verbs(event);
    println!(
        "{}: {} after {}",
        identity.address(),
        format!("{} complete", past).green().bold(),
        format_duration(elapsed_secs).bold(),
    );
}

pub(crate) fn failed(
    identity: &ResourceIdentity,
    event: LifecycleEvent,
    elapsed_secs: u64,
    error: &str,
    quiet: bool,
) {
    if quiet {
        return;
    }
    let (_, past) = verbs(event);
    println!(
        "{}: {} {} after {} — {}",
        identity.address().bold(),
        past,
        "FAILED".red().bold(),
        format_duration(elapsed_secs),
        error.red(),
    );
}

pub(crate) fn skipped(identity: &ResourceIdentity, reason: &str, quiet: bool) {
    if quiet {
        return;
    }
    println!(
        "{}: {} — {}",
        identity.address().bold(),
        "Skipped".yellow(),
        reason.dimmed(),
    );
}

/// Format seconds into a human-readable duration string.
pub(crate) fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else {
        let mins = secs / 60;
        let remaining = secs % 60;
        if remaining == 0 {
            format!("{}m", mins)
        } else {
            format!("{}m{}s", mins, remaining)
        }
    }
}
