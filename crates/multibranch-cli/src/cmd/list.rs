use crate::output::{print_json, print_table};
use multibranch_cli::project;
use multibranch_core::project::Child;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct Entry {
    name: String,
    branch: Option<String>,
    source: Option<String>,
    state: &'static str,
    last_built: Option<String>,
    last_seen: Option<String>,
}

impl From<&Child> for Entry {
    fn from(child: &Child) -> Self {
        match child {
            Child::Project(p) => Entry {
                name: p.name.clone(),
                branch: Some(p.branch_name().to_string()),
                source: (!p.is_dead()).then(|| p.branch.source_id().to_string()),
                state: if p.is_dead() { "dead" } else { "live" },
                last_built: p.last_built.as_ref().map(|r| r.hash.clone()),
                last_seen: p.last_seen.as_ref().map(|r| r.hash.clone()),
            },
            Child::Unrecognized { name, .. } => Entry {
                name: name.clone(),
                branch: None,
                source: None,
                state: "unrecognized",
                last_built: None,
                last_seen: None,
            },
        }
    }
}

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let (_, project) = project::open(root)?;
    let entries: Vec<Entry> = project.children().iter().map(Entry::from).collect();

    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No branch projects. Run `mbranch scan`.");
        return Ok(());
    }
    let dash = || "-".to_string();
    let rows = entries
        .into_iter()
        .map(|e| {
            vec![
                e.name,
                e.branch.unwrap_or_else(dash),
                e.source.unwrap_or_else(dash),
                e.state.to_string(),
                e.last_built.unwrap_or_else(dash),
                e.last_seen.unwrap_or_else(dash),
            ]
        })
        .collect();
    print_table(
        &["NAME", "BRANCH", "SOURCE", "STATE", "BUILT", "SEEN"],
        rows,
    );
    Ok(())
}
