use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::{info, warn};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use creditfarm::config::Config;
use creditfarm::domain::{Account, AccountUpdate};
use creditfarm::earn::EarnWorker;
use creditfarm::notify::WebhookNotifier;
use creditfarm::session::{CookieJar, PanelClient};
use creditfarm::storage::{AccountStore, JsonlAccountStore};
use creditfarm::supervisor::{SessionStatus, StoreSync, Supervisor, Worker};

mod cli;

use cli::Cli;
use cli::commands::{AccountCommands, Commands};

fn setup_logging(default_level: &str) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("creditfarm")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("creditfarm.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        None | Some(Commands::Run) => handle_run_command(config, cli.is_verbose()).await,
        Some(Commands::Accounts { command }) => handle_accounts_command(command, config).await,
    }
}

fn open_store(config: &Config) -> Result<Arc<JsonlAccountStore>> {
    let store = JsonlAccountStore::new(&config.storage.dir)
        .context(format!("Failed to open account store in {}", config.storage.dir.display()))?;
    Ok(Arc::new(store))
}

async fn handle_run_command(config: &Config, verbose: bool) -> Result<()> {
    let store = open_store(config)?;
    let accounts = store.list_accounts().await.context("Failed to list accounts")?;
    if accounts.is_empty() {
        println!(
            "{} add one with `creditfarm accounts add --id <id> --cookies <header>`",
            "No accounts configured:".yellow()
        );
        return Ok(());
    }

    let client = Arc::new(PanelClient::new(config.panel_config()).context("Failed to build panel client")?);
    let notifier = Arc::new(WebhookNotifier::new(config.notifier_config()).context("Failed to build notifier")?);
    let worker = Arc::new(EarnWorker::new(client, store.clone(), notifier, config.earn_loop_config()));
    let supervisor = Supervisor::new(worker, config.supervisor_config());

    supervisor
        .start(accounts.iter().map(|account| account.id.clone()))
        .await
        .context("Failed to start supervisor")?;
    let mut sync = StoreSync::seeded(&accounts);
    info!(
        "Supervising {} account(s), interval={}ms",
        accounts.len(),
        config.worker.interval_ms
    );
    println!(
        "{} {} account(s), interval {}s. Press Ctrl-C to stop.",
        "Farming:".green(),
        accounts.len(),
        config.interval().as_secs_f64()
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(config.status.report_interval_secs.max(1)));
    ticker.tick().await;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result.context("Failed to listen for Ctrl-C")?;
                break;
            }
            _ = ticker.tick() => {
                match sync.apply(&supervisor, store.as_ref()).await {
                    Ok(report) if !report.is_empty() => info!("Store sync: {:?}", report),
                    Ok(_) => {}
                    Err(e) => warn!("Store sync failed: {}", e),
                }
                report_status(&supervisor, verbose).await;
            }
        }
    }

    println!("{}", "Stopping...".yellow());
    supervisor.shutdown().await;
    Ok(())
}

async fn report_status<W: Worker>(supervisor: &Supervisor<W>, verbose: bool) {
    let summary = supervisor.summary().await;
    info!(
        "Status: {} account(s), {} active, total balance {}, {} restart(s), up {}s",
        summary.total_accounts, summary.active_workers, summary.total_balance, summary.total_restarts, summary.uptime
    );
    println!(
        "{} {}/{} active, balance {}, restarts {}",
        "Status:".cyan(),
        summary.active_workers,
        summary.total_accounts,
        summary.total_balance,
        summary.total_restarts
    );

    if !verbose {
        return;
    }
    for snapshot in supervisor.snapshots().await {
        let status = match snapshot.session_status {
            SessionStatus::Valid => "valid".green(),
            SessionStatus::Refreshed => "refreshed".cyan(),
            SessionStatus::Expired => "expired".red(),
            SessionStatus::Unknown => "unknown".dimmed(),
        };
        let balance = snapshot
            .balance
            .map(|b| b.to_string())
            .unwrap_or_else(|| "-".to_string());
        let last_error = snapshot
            .last_error
            .as_ref()
            .map(|e| e.message().to_string())
            .unwrap_or_default();
        println!(
            "  {:<16} {:<10} balance={:<10} restarts={} {}",
            snapshot.id,
            status,
            balance,
            snapshot.restarts,
            last_error.red()
        );
    }
}

async fn handle_accounts_command(command: &AccountCommands, config: &Config) -> Result<()> {
    info!("Handling accounts command: {:?}", command);
    let store = open_store(config)?;

    match command {
        AccountCommands::List => {
            let accounts = store.list_accounts().await.context("Failed to list accounts")?;
            if accounts.is_empty() {
                println!("{}", "No accounts configured".yellow());
            }
            for account in accounts {
                let admin = if account.is_admin { " [admin]".magenta() } else { "".normal() };
                let webhook = if account.webhook_url().is_some() {
                    "webhook".green()
                } else {
                    "no webhook".dimmed()
                };
                println!(
                    "{} {}{} ({} cookies, {})",
                    account.id.bold(),
                    account.name,
                    admin,
                    account.cookies.len(),
                    webhook
                );
            }
        }
        AccountCommands::Add {
            id,
            name,
            cookies,
            webhook,
            admin,
        } => {
            let jar = CookieJar::parse(cookies);
            if jar.is_empty() {
                eyre::bail!("No cookies found in {:?}", cookies);
            }
            let mut account = Account::new(id, jar).with_admin(*admin);
            if let Some(name) = name {
                account = account.with_name(name);
            }
            if let Some(webhook) = webhook {
                account = account.with_webhook(webhook);
            }
            store
                .create_account(&account)
                .await
                .context(format!("Failed to add account {}", id))?;
            println!("{} {} ({} cookies)", "Added:".green(), id, account.cookies.len());
        }
        AccountCommands::Update {
            id,
            cookies,
            name,
            webhook,
        } => {
            let jar = CookieJar::parse(cookies);
            if jar.is_empty() {
                eyre::bail!("No cookies found in {:?}", cookies);
            }
            let update = AccountUpdate {
                name: name.clone(),
                cookies: Some(jar),
                webhook: webhook.clone(),
            };
            let account = store
                .update_account(id, &update)
                .await
                .context(format!("Failed to update account {}", id))?;
            println!("{} {} ({} cookies)", "Updated:".green(), id, account.cookies.len());
        }
        AccountCommands::Remove { id } => {
            store
                .delete_account(id)
                .await
                .context(format!("Failed to remove account {}", id))?;
            println!("{} {}", "Removed:".red(), id);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    // Setup logging
    let level = if cli.is_verbose() {
        "debug"
    } else {
        config.log_level.as_deref().unwrap_or("info")
    };
    setup_logging(level).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
