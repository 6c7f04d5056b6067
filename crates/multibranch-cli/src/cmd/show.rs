use crate::output::print_json;
use anyhow::bail;
use multibranch_cli::project;
use multibranch_core::project::Child;
use multibranch_core::ReconcileError;
use std::path::Path;

pub fn run(root: &Path, name: &str, json: bool) -> anyhow::Result<()> {
    let (_, project) = project::open(root)?;
    let child = project
        .child(name)
        .ok_or_else(|| ReconcileError::ChildNotFound(name.to_string()))?;
    let Child::Project(p) = child else {
        bail!(ReconcileError::NotAProject(name.to_string()));
    };

    if json {
        return print_json(&p);
    }
    println!("Name:       {}", p.name);
    println!("Branch:     {} ({})", p.branch_name(), p.branch.head().pronoun());
    if let Some(display) = &p.display_name {
        println!("Display:    {display}");
    }
    if p.is_dead() {
        let since = p
            .dead_since
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string());
        println!("State:      dead since {since}");
    } else {
        println!("State:      live");
        println!("Source:     {}", p.branch.source_id());
        let scm = p.branch.scm();
        println!("Ref:        {} {} {}", scm.kind, scm.remote, scm.reference);
    }
    let rev = |r: Option<&multibranch_core::Revision>| {
        r.map(|r| r.hash.clone()).unwrap_or_else(|| "-".to_string())
    };
    println!("Last built: {}", rev(p.last_built.as_ref()));
    println!("Last seen:  {}", rev(p.last_seen.as_ref()));
    if let Some(retention) = &p.retention {
        println!(
            "Retention:  days={} builds={}",
            retention.days_to_keep.map_or("-".to_string(), |d| d.to_string()),
            retention.num_to_keep.map_or("-".to_string(), |n| n.to_string())
        );
    }
    for action in p.branch.actions() {
        println!("  {}: {}", action.name, action.value);
    }
    Ok(())
}
