pub mod collect;
pub mod show;

use cloudtally_config::{AccountConfig, Settings};

/// Accounts a command applies to: the named one, or all configured accounts
pub fn select_accounts<'a>(
    settings: &'a Settings,
    name: Option<&str>,
) -> anyhow::Result<Vec<&'a AccountConfig>> {
    match name {
        Some(name) => {
            let account = settings
                .accounts
                .iter()
                .find(|a| a.name == name || a.account_id == name)
                .ok_or_else(|| anyhow::anyhow!("Account '{}' is not configured", name))?;
            Ok(vec![account])
        }
        None => {
            if settings.accounts.is_empty() {
                anyhow::bail!("No accounts configured");
            }
            Ok(settings.accounts.iter().collect())
        }
    }
}
