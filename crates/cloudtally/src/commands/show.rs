use super::select_accounts;
use cloudtally_config::Settings;
use cloudtally_core::{FileStore, Inventory, ResourceKind, StoredRecord};
use colored::Colorize;

/// Records of the given accounts, optionally narrowed to one kind
fn filter<'a>(
    inventory: &'a Inventory,
    account_ids: &[&str],
    kind: Option<ResourceKind>,
) -> Vec<&'a StoredRecord> {
    inventory
        .iter()
        .filter(|r| account_ids.contains(&r.account_id.as_str()))
        .filter(|r| kind.is_none_or(|k| r.kind == k))
        .collect()
}

pub async fn handle(
    settings: &Settings,
    account: Option<&str>,
    kind: Option<ResourceKind>,
    json: bool,
) -> anyhow::Result<()> {
    let store = FileStore::new(settings.state_dir()?);
    let inventory = store.load().await?;
    let accounts = select_accounts(settings, account)?;
    let account_ids: Vec<&str> = accounts.iter().map(|a| a.account_id.as_str()).collect();

    let records = filter(&inventory, &account_ids, kind);

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("{}", "No records in the inventory".dimmed());
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "{:<14} {:<25} {:<40} {:<20}",
            "ACCOUNT", "KIND", "NAME", "UPDATED"
        )
        .bold()
    );
    println!("{}", "─".repeat(100).dimmed());

    for record in &records {
        let account_name = accounts
            .iter()
            .find(|a| a.account_id == record.account_id)
            .map(|a| a.name.as_str())
            .unwrap_or(record.account_id.as_str());
        println!(
            "{:<14} {:<25} {:<40} {:<20}",
            account_name.cyan(),
            record.kind.as_str(),
            record.display_name(),
            record.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    println!();
    println!(
        "{} record(s), inventory updated {}",
        records.len(),
        inventory.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(())
}
