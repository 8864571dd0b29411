mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use cloudtally_aws::Family;
use cloudtally_config::Settings;
use cloudtally_core::ResourceKind;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Keep a reconciled inventory of your AWS resources", long_about = None)]
struct Cli {
    /// Config file (defaults to cloudtally.yaml discovery)
    #[arg(short, long, global = true, env = "CLOUDTALLY_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch resources from AWS and reconcile the inventory
    Collect {
        /// Resource families to collect (comma separated)
        #[arg(short, long, value_enum, value_delimiter = ',', default_value = "all")]
        family: Vec<FamilyArg>,
        /// Only collect this account (TALLY_ACCOUNT)
        #[arg(short, long, env = "TALLY_ACCOUNT")]
        account: Option<String>,
    },
    /// Show the recorded inventory
    Show {
        /// Only show this account (TALLY_ACCOUNT)
        #[arg(short, long, env = "TALLY_ACCOUNT")]
        account: Option<String>,
        /// Only show records of this kind, e.g. dns_record
        #[arg(short, long)]
        kind: Option<ResourceKind>,
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show version information
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FamilyArg {
    Dns,
    S3,
    Cdn,
    Iam,
    All,
}

impl FamilyArg {
    fn families(args: &[FamilyArg]) -> Vec<Family> {
        let mut families = Vec::new();
        for arg in args {
            let expanded = match arg {
                FamilyArg::Dns => vec![Family::Dns],
                FamilyArg::S3 => vec![Family::S3],
                FamilyArg::Cdn => vec![Family::Cdn],
                FamilyArg::Iam => vec![Family::Iam],
                FamilyArg::All => Family::ALL.to_vec(),
            };
            for family in expanded {
                if !families.contains(&family) {
                    families.push(family);
                }
            }
        }
        families
    }
}

fn load_settings(path: Option<&PathBuf>) -> anyhow::Result<Settings> {
    let settings = match path {
        Some(path) => Settings::load(path)?,
        None => Settings::load_default()?,
    };
    tracing::debug!("Loaded {} account(s) from config", settings.accounts.len());
    Ok(settings)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Version => {
            println!("cloudtally {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Collect { family, account } => {
            let settings = load_settings(cli.config.as_ref())?;
            commands::collect::handle(&settings, account.as_deref(), &FamilyArg::families(&family))
                .await?;
        }
        Commands::Show {
            account,
            kind,
            json,
        } => {
            let settings = load_settings(cli.config.as_ref())?;
            commands::show::handle(&settings, account.as_deref(), kind, json).await?;
        }
    }

    Ok(())
}
