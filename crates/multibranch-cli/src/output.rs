use multibranch_core::ReconcileReport;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let render = |cells: Vec<String>| {
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{cell:w$}")
            })
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    println!("{}", render(headers.iter().map(|h| h.to_string()).collect()));
    println!("{}", render(widths.iter().map(|&w| "-".repeat(w)).collect()));
    for row in rows {
        println!("{}", render(row));
    }
}

/// Human or JSON rendering of one pass.
pub fn print_report(report: &ReconcileReport, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(report);
    }
    if report.outcomes.is_empty() {
        println!("Nothing to reconcile.");
    } else {
        let rows = report
            .outcomes
            .iter()
            .map(|o| {
                let mut change = o.change.to_string();
                if !o.persisted {
                    change.push_str(" (not saved)");
                }
                vec![
                    o.name.clone(),
                    o.branch.clone(),
                    o.source_id.clone().unwrap_or_else(|| "-".to_string()),
                    change,
                    o.build.to_string(),
                ]
            })
            .collect();
        print_table(&["NAME", "BRANCH", "SOURCE", "CHANGE", "BUILD"], rows);
    }
    for failed in &report.failed_sources {
        eprintln!("warning: source {} failed: {}", failed.id, failed.error);
    }
    println!(
        "\n{} changed, {} scheduled",
        report.mutations(),
        report.scheduled().len()
    );
    Ok(())
}
