//! Crowdfund CLI
//!
//! Command-line interface for the crowdfunding contracts:
//! - Connect a wallet and check status
//! - List and inspect campaigns (live or from the local mirror)
//! - Create campaigns, donate, create and vote on milestones, withdraw
//! - Watch for account changes and refresh periodically

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use crowdfund::campaign::{
    ActionOutcome, CampaignView, CreateCampaignRequest, RefreshReport, DEFAULT_CID,
};
use crowdfund::chain::{eth_label, Address};
use crowdfund::config::{generate_default_config, Config, LoadedConfig};
use crowdfund::context::AppContext;
use crowdfund::logging::init_logging;
use crowdfund::wallet::Signer;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "crowdfund")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Client for milestone-based crowdfunding contracts")]
#[command(long_about = "Crowdfund talks to a campaign factory contract through a JSON-RPC node.\nBrowse campaigns, donate, and manage milestones from the terminal.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ~/.config/crowdfund/config.toml, /etc/crowdfund/config.toml, ./config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Send transactions from this account instead of the first authorized one
    #[arg(long, global = true)]
    pub account: Option<Address>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table, global = true)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Request wallet access and show the selected account
    Connect,

    /// Show configuration, wallet and store status
    Status,

    /// List campaigns
    Campaigns {
        /// Read the local mirror instead of the chain
        #[arg(long)]
        offline: bool,
    },

    /// Show one campaign with its milestones and donors
    Show {
        /// Campaign contract address
        campaign: Address,
        /// Read the chain instead of the local mirror
        #[arg(long)]
        refresh: bool,
    },

    /// Create a new campaign
    Create {
        /// Content identifier of the campaign description
        #[arg(long, default_value = DEFAULT_CID)]
        cid: String,
        /// Funding target in ether
        #[arg(long, default_value = "1")]
        amount: String,
        /// Ether sent with the creation call
        #[arg(long, default_value = "0.001")]
        value: String,
        /// Campaign length in seconds
        #[arg(long, default_value = "600")]
        duration: u64,
    },

    /// Donate to a campaign
    Donate {
        campaign: Address,
        /// Amount in ether
        amount: String,
    },

    /// Create a milestone on a campaign you own
    Milestone {
        campaign: Address,
        /// Content identifier of the milestone description
        #[arg(long, default_value = DEFAULT_CID)]
        cid: String,
        /// Voting period passed to the contract
        #[arg(long, default_value = "1")]
        voting_period: u64,
        /// Milestone slot, 0-based
        #[arg(long)]
        counter: u64,
    },

    /// Vote on a milestone as a donor
    Vote {
        campaign: Address,
        /// Milestone slot, 0-based
        #[arg(long)]
        counter: u64,
        /// Vote to approve
        #[arg(long, conflicts_with = "reject")]
        approve: bool,
        /// Vote to reject
        #[arg(long)]
        reject: bool,
    },

    /// Withdraw an approved milestone's payout
    WithdrawMilestone {
        campaign: Address,
        /// Milestone slot, 0-based
        #[arg(long)]
        counter: u64,
    },

    /// Withdraw the factory's accumulated funds
    WithdrawFunds,

    /// Show the factory's ether balance
    Balance,

    /// Follow account changes and refresh campaigns periodically
    Watch {
        /// Refresh interval in seconds (default: refresh.watch_interval_secs)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        return write_default_config(output.as_ref());
    }

    let loaded = match &cli.config {
        Some(path) => LoadedConfig::from_path(path)?,
        None => Config::discover(),
    };
    init_logging(&loaded.config.logging);
    loaded.log();

    tracing::debug!("Crowdfund v{}", env!("CARGO_PKG_VERSION"));
    let ctx = AppContext::new(loaded.config)?;

    match cli.command {
        Commands::Connect => {
            let signer = ctx.wallet.connect_wallet().await?;
            match cli.format {
                OutputFormat::Json => print_json(&json!({ "account": signer.address() }))?,
                OutputFormat::Table => println!("Connected: {}", signer.address()),
            }
        }

        Commands::Status => status(&ctx, cli.format).await?,

        Commands::Campaigns { offline } => {
            let campaigns = if offline {
                ctx.store.all()?
            } else {
                match ctx.chain() {
                    Ok(chain) => {
                        let report = chain.refresher.refresh().await?;
                        report_failures(&report);
                        chain.refresher.campaigns().await
                    }
                    Err(e) => {
                        eprintln!("{}; showing the local mirror", e);
                        ctx.store.all()?
                    }
                }
            };

            match cli.format {
                OutputFormat::Json => print_json(&campaigns)?,
                OutputFormat::Table => print_campaigns(&campaigns),
            }
        }

        Commands::Show { campaign, refresh } => {
            let view = if refresh {
                Some(ctx.chain()?.refresher.fetch_campaign(campaign).await?)
            } else {
                match ctx.chain() {
                    Ok(chain) => chain.actions.view_campaign_details(campaign)?,
                    Err(_) => ctx.store.get_object(campaign)?,
                }
            };

            let Some(view) = view else {
                bail!(
                    "Campaign {} is not in the local mirror; run `crowdfund campaigns` or pass --refresh",
                    campaign
                );
            };

            match cli.format {
                OutputFormat::Json => print_json(&view)?,
                OutputFormat::Table => {
                    let viewer = match cli.account {
                        Some(account) => Some(account),
                        None if ctx.wallet.provider().is_ok() => {
                            ctx.wallet.check_wallet_connected().await.ok().flatten()
                        }
                        None => None,
                    };
                    print_campaign(&view, viewer);
                }
            }
        }

        Commands::Create {
            cid,
            amount,
            value,
            duration,
        } => {
            let chain = ctx.chain()?;
            let signer = resolve_signer(&ctx, cli.account).await?;
            let request = CreateCampaignRequest {
                funding_cid: cid,
                amount_to_raise: amount,
                value,
                duration,
            };
            let outcome = chain.actions.create_campaign(&signer, &request).await?;
            print_outcome(cli.format, "create", &outcome)?;
        }

        Commands::Donate { campaign, amount } => {
            let chain = ctx.chain()?;
            let signer = resolve_signer(&ctx, cli.account).await?;
            let outcome = chain.actions.donate(&signer, campaign, &amount).await?;
            print_outcome(cli.format, "donate", &outcome)?;
        }

        Commands::Milestone {
            campaign,
            cid,
            voting_period,
            counter,
        } => {
            let chain = ctx.chain()?;
            let signer = resolve_signer(&ctx, cli.account).await?;
            let outcome = chain
                .actions
                .create_milestone(&signer, campaign, &cid, voting_period, counter)
                .await?;
            print_outcome(cli.format, "milestone", &outcome)?;
        }

        Commands::Vote {
            campaign,
            counter,
            approve,
            reject,
        } => {
            let vote = match (approve, reject) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let chain = ctx.chain()?;
            let signer = resolve_signer(&ctx, cli.account).await?;
            let outcome = chain.actions.vote(&signer, campaign, vote, counter).await?;
            print_outcome(cli.format, "vote", &outcome)?;
        }

        Commands::WithdrawMilestone { campaign, counter } => {
            let chain = ctx.chain()?;
            let signer = resolve_signer(&ctx, cli.account).await?;
            let outcome = chain
                .actions
                .withdraw_milestone(&signer, campaign, counter)
                .await?;
            print_outcome(cli.format, "withdraw-milestone", &outcome)?;
        }

        Commands::WithdrawFunds => {
            let chain = ctx.chain()?;
            let signer = resolve_signer(&ctx, cli.account).await?;
            let outcome = chain.actions.withdraw_funds(&signer).await?;
            print_outcome(cli.format, "withdraw-funds", &outcome)?;
        }

        Commands::Balance => {
            let chain = ctx.chain()?;
            let balance = chain.gateway.get_factory_balance().await?;
            match cli.format {
                OutputFormat::Json => print_json(&json!({
                    "factory": chain.gateway.factory_address(),
                    "wei": balance.to_string(),
                    "balance": eth_label(balance),
                }))?,
                OutputFormat::Table => println!(
                    "Factory {} holds {}",
                    chain.gateway.factory_address(),
                    eth_label(balance)
                ),
            }
        }

        Commands::Watch { interval } => {
            let interval = interval.unwrap_or(ctx.config.refresh.watch_interval_secs);
            watch(&ctx, Duration::from_secs(interval.max(1))).await?;
        }

        Commands::Config { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

fn write_default_config(output: Option<&PathBuf>) -> anyhow::Result<()> {
    let config = generate_default_config();

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &config)
                .with_context(|| format!("Failed to write config to {:?}", path))?;
            println!("Config written to {:?}", path);
        }
        None => print!("{}", config),
    }
    Ok(())
}

/// Signer for `--account`, or the first account the wallet authorizes
async fn resolve_signer(ctx: &AppContext, account: Option<Address>) -> anyhow::Result<Signer> {
    match account {
        Some(address) => Ok(Signer::new(address, ctx.wallet.provider()?.clone())),
        None => Ok(ctx.wallet.connect_wallet().await?),
    }
}

async fn status(ctx: &AppContext, format: OutputFormat) -> anyhow::Result<()> {
    let (account, timestamp) = if ctx.wallet.provider().is_ok() {
        let account = ctx.wallet.check_wallet_connected().await;
        let timestamp = ctx.wallet.latest_block_timestamp().await;
        (Some(account), Some(timestamp))
    } else {
        (None, None)
    };
    let stored = ctx.store.count()?;
    let chain = ctx.chain();

    if format == OutputFormat::Json {
        return print_json(&json!({
            "version": env!("CARGO_PKG_VERSION"),
            "rpcUrl": ctx.config.chain.rpc_url,
            "factoryAddress": ctx.config.chain.factory_address,
            "chainAvailable": chain.is_ok(),
            "account": account.as_ref().and_then(|a| a.as_ref().ok().copied().flatten()),
            "latestBlockTimestamp": timestamp.as_ref().and_then(|t| t.as_ref().ok().copied()),
            "storedCampaigns": stored,
            "store": ctx.store.path(),
        }));
    }

    println!("Crowdfund v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!(
        "RPC endpoint: {}",
        ctx.config.chain.rpc_url.as_deref().unwrap_or("(none)")
    );
    println!(
        "Factory:      {}",
        ctx.config.chain.factory_address.as_deref().unwrap_or("(none)")
    );
    if let Err(e) = &chain {
        println!("Chain:        {}", e);
    }

    println!();
    match account {
        None => println!("Wallet:       no provider"),
        Some(Ok(Some(address))) => println!("Wallet:       {}", address),
        Some(Ok(None)) => println!("Wallet:       no authorized account"),
        Some(Err(e)) => println!("Wallet:       {}", e),
    }
    match timestamp {
        Some(Ok(ts)) => println!("Latest block: {}", format_timestamp(ts)),
        Some(Err(e)) => println!("Latest block: {}", e),
        None => {}
    }

    println!();
    println!("Store:");
    if let Some(path) = ctx.store.path() {
        println!("  Path: {:?}", path);
    }
    println!("  Campaigns: {}", stored);
    Ok(())
}

async fn watch(ctx: &AppContext, interval: Duration) -> anyhow::Result<()> {
    let chain = ctx.chain()?;
    let mut accounts = ctx.wallet.subscribe();
    let mut phases = chain.refresher.subscribe_phase();
    let listener = ctx.wallet.clone().spawn_account_listener();

    match ctx.wallet.check_wallet_connected().await {
        Ok(Some(account)) => println!("Account: {}", account),
        Ok(None) => println!("Account: none authorized"),
        Err(e) => tracing::warn!(error = %e, "Wallet check failed"),
    }

    let refresher = Arc::clone(&chain.refresher);
    let refresh_loop = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match refresher.refresh().await {
                Ok(report) => report_failures(&report),
                Err(e) => tracing::error!(error = %e, "Refresh failed"),
            }
        }
    });

    tracing::info!(interval_secs = interval.as_secs(), "Watching; press Ctrl-C to stop");
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            Ok(account) = accounts.recv() => match account {
                Some(address) => println!("Account changed: {}", address),
                None => println!("Account disconnected"),
            },
            Ok(()) = phases.changed() => {
                let phase = *phases.borrow_and_update();
                tracing::debug!(?phase, "Refresh phase");
            }
        }
    }

    refresh_loop.abort();
    if let Some(listener) = listener {
        listener.abort();
    }
    Ok(())
}

fn report_failures(report: &RefreshReport) {
    for failure in &report.failures {
        eprintln!("warning: {} could not be refreshed: {}", failure.address, failure.error);
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_outcome(format: OutputFormat, action: &str, outcome: &ActionOutcome) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        let refresh = match &outcome.refresh {
            Ok(report) => json!(report),
            Err(e) => json!({ "error": e.to_string() }),
        };
        return print_json(&json!({
            "action": action,
            "receipt": outcome.receipt,
            "campaignAddress": outcome.campaign_address,
            "refresh": refresh,
        }));
    }

    println!(
        "{} confirmed in block {} (tx {})",
        action, outcome.receipt.block_number, outcome.receipt.transaction_hash
    );
    if let Some(address) = outcome.campaign_address {
        println!("Created a new campaign with address {}", address);
    }
    match &outcome.refresh {
        Ok(report) => {
            report_failures(report);
            println!("Refreshed {} of {} campaigns", report.updated, report.total);
        }
        Err(e) => eprintln!("warning: refresh after {} failed: {}", action, e),
    }
    Ok(())
}

fn print_campaigns(campaigns: &[CampaignView]) {
    if campaigns.is_empty() {
        println!("No campaigns yet.");
        println!();
        println!("Create the first one with:");
        println!("  crowdfund create --amount 1 --duration 600");
        return;
    }

    println!(
        "{:<42} {:>12} {:>12} {:>6} {:>8} {:>10} {}",
        "Campaign", "Target", "Raised", "Donors", "Progress", "Remaining", "Ended"
    );
    println!("{}", "-".repeat(102));

    for c in campaigns {
        println!(
            "{:<42} {:>12} {:>12} {:>6} {:>7.1}% {:>10} {}",
            c.campaign_address.to_string(),
            c.campaign_target_amount,
            c.received_donation,
            c.no_of_donors,
            c.progress_value,
            format_duration(c.remaining_duration),
            if c.has_campaign_ended { "yes" } else { "no" }
        );
    }
}

fn print_campaign(c: &CampaignView, viewer: Option<Address>) {
    println!("Campaign {}", c.campaign_address);
    println!("  Owner:      {}", c.campaign_owner);
    println!("  Funding:    {}", c.funding_cid);
    println!("  Target:     {}", c.campaign_target_amount);
    println!("  Raised:     {} from {} donors", c.received_donation, c.no_of_donors);
    println!("  Balance:    {}", c.balance);
    println!(
        "  Deadline:   {} ({} left)",
        format_timestamp(c.campaign_duration),
        format_duration(c.remaining_duration)
    );
    println!("  Ended:      {}", if c.has_campaign_ended { "yes" } else { "no" });
    println!("  Progress:   {:.1}% ({} milestones completed)", c.progress_value, c.current_milestone);
    if let Some(account) = viewer {
        let role = match (c.is_owner(account), c.is_donor(account)) {
            (true, _) => "owner",
            (false, true) => "donor",
            (false, false) => "not a donor",
        };
        println!("  You:        {} ({})", account, role);
    }

    println!();
    if c.milestones.is_empty() {
        println!("No milestones.");
    } else {
        println!("{:<12} {:<10} {:>10} {:>6}  {}", "Milestone", "Status", "Voting", "Votes", "CID");
        for m in &c.milestones {
            println!(
                "{:<12} {:<10} {:>10} {:>6}  {}",
                m.label,
                m.status.label(),
                format_duration(m.remaining_voting_time),
                m.votes.len(),
                m.milestone_cid
            );
        }
    }

    println!();
    if c.donors_list.is_empty() {
        println!("No donors.");
    } else {
        println!("{:<42} {:>14}", "Donor", "Amount");
        for d in &c.donors_list {
            println!("{:<42} {:>14}", d.address.to_string(), d.amount);
        }
    }
}

fn format_timestamp(seconds: u64) -> String {
    i64::try_from(seconds)
        .ok()
        .and_then(|s| chrono::DateTime::from_timestamp(s, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| seconds.to_string())
}

fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else if seconds < 86400 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else {
        format!("{}d {}h", seconds / 86400, (seconds % 86400) / 3600)
    }
}
