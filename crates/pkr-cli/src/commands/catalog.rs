use anyhow::Result;
use serde_json::json;

use pkr_schema::IDENT_RULE;

use super::load_catalog;

pub fn catalog_show(schema: &str, as_json: bool) -> Result<()> {
    let catalog = load_catalog(Some(schema))?;

    if as_json {
        let tables: Vec<_> = catalog
            .tables()
            .map(|(table, keys)| json!({ "table": table, "keys": keys }))
            .collect();
        let invalid: Vec<_> = catalog
            .invalid()
            .map(|(table, reason)| json!({ "table": table, "reason": reason }))
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "tables": tables, "invalid": invalid }))?
        );
        return Ok(());
    }

    for (table, keys) in catalog.tables() {
        let cols: Vec<String> = keys
            .iter()
            .map(|k| {
                if k.is_autoincrement {
                    format!("{}(auto_increment)", k.column_name)
                } else {
                    k.column_name.to_string()
                }
            })
            .collect();
        println!("table={} keys={}", table, cols.join(","));
    }
    for (table, reason) in catalog.invalid() {
        println!("invalid={} reason={}", table, reason);
    }
    if catalog.invalid().next().is_some() {
        println!("note={IDENT_RULE}");
    }
    println!(
        "tables={} invalid={}",
        catalog.len(),
        catalog.invalid().count()
    );
    Ok(())
}
