use crate::output::{print_json, print_table};
use multibranch_core::mangle;

pub fn run(names: &[String], json: bool) -> anyhow::Result<()> {
    let pairs: Vec<(String, String)> = names.iter().map(|n| (n.clone(), mangle(n))).collect();
    if json {
        let value: Vec<serde_json::Value> = pairs
            .iter()
            .map(|(name, encoded)| serde_json::json!({ "name": name, "encoded": encoded }))
            .collect();
        return print_json(&value);
    }
    if let [(_, encoded)] = pairs.as_slice() {
        println!("{encoded}");
        return Ok(());
    }
    print_table(
        &["NAME", "ENCODED"],
        pairs.into_iter().map(|(n, e)| vec![n, e]).collect(),
    );
    Ok(())
}
