use super::select_accounts;
use cloudtally_aws::{AwsClients, Family, parse_families};
use cloudtally_config::{AccountConfig, RetrySettings, Settings};
use cloudtally_core::{Account, FileStore, PassReport, RetryConfig, run_with_retry};
use colored::Colorize;
use std::time::Duration;

pub fn retry_config(settings: &RetrySettings) -> RetryConfig {
    RetryConfig {
        max_attempts: settings.max_attempts,
        initial_delay: Duration::from_millis(settings.initial_delay_ms),
        max_delay: Duration::from_millis(settings.max_delay_ms),
        backoff_multiplier: settings.backoff_multiplier,
    }
}

/// Requested families narrowed to the ones the account opts into
fn families_for(account: &AccountConfig, requested: &[Family]) -> anyhow::Result<Vec<Family>> {
    let Some(names) = &account.families else {
        return Ok(requested.to_vec());
    };
    let allowed = parse_families(names)?;
    Ok(requested
        .iter()
        .copied()
        .filter(|family| allowed.contains(family))
        .collect())
}

fn print_report(family: Family, report: &PassReport) {
    let summary = report.summary();
    let marker = if report.has_changes() {
        "✓".green()
    } else {
        "✓".dimmed()
    };
    println!(
        "  {} {:<4} {} ({}ms)",
        marker,
        family.as_str().bold(),
        summary,
        report.duration_ms
    );
}

pub async fn handle(
    settings: &Settings,
    account: Option<&str>,
    families: &[Family],
) -> anyhow::Result<()> {
    let store = FileStore::new(settings.state_dir()?);
    let retry = retry_config(&settings.retry);
    let accounts = select_accounts(settings, account)?;

    tracing::debug!("Inventory state directory: {}", store.state_dir().display());

    let mut failures = 0;
    for account_config in accounts {
        println!(
            "{} {} ({})",
            "Collecting".blue(),
            account_config.name.cyan(),
            account_config.account_id
        );

        let families = families_for(account_config, families)?;
        if families.is_empty() {
            println!("  {}", "no families selected for this account".dimmed());
            continue;
        }

        let clients = AwsClients::load(
            account_config.profile.as_deref(),
            account_config.region.as_deref(),
        )
        .await;
        let account = Account::new(&account_config.name, &account_config.account_id);

        for family in families {
            let collector = family.collector(&clients, account.clone());
            match run_with_retry(&store, collector.as_ref(), &retry).await {
                Ok(report) => print_report(family, &report),
                Err(err) => {
                    failures += 1;
                    println!("  {} {:<4} {}", "✗".red(), family.as_str().bold(), err);
                }
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} collector pass(es) failed", failures);
    }
    Ok(())
}
