use anyhow::Result;
use certwatch::cli::{Args, Command};
use certwatch::config::Config;
use certwatch::dispatcher::WebhookDispatcher;
use certwatch::inventory::{parse_target, CertificateDescriptor};
use certwatch::MonitorDaemon;
use clap::Parser;
use colored::Colorize;
use std::path::Path;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider (required for rustls 0.23+)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    // Initialize logging - respect RUST_LOG environment variable
    let log_level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse::<Level>().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("failed to set subscriber");

    let args = Args::parse();

    match args.command {
        Command::Daemon => {
            let config = Config::from_file(&args.config)?;
            let daemon = MonitorDaemon::new(args.config.clone(), &config);
            daemon.run().await
        }
        Command::Check => run_check(&args.config).await,
        Command::Add {
            target,
            label,
            threshold_days,
        } => add_certificate(&args.config, &target, label, threshold_days),
        Command::Remove { id } => remove_certificate(&args.config, &id),
        Command::List => list_certificates(&args.config),
        Command::SetWebhook { url } => set_webhook(&args.config, url),
        Command::SetThreshold { days } => set_threshold(&args.config, days),
        Command::TestWebhook => test_webhook(&args.config).await,
        Command::InitConfig => init_config(&args.config),
    }
}

async fn run_check(config_path: &Path) -> Result<()> {
    let config = Config::from_file(config_path)?;
    let daemon = MonitorDaemon::new(config_path.to_path_buf(), &config);
    let stats = daemon.run_cycle(&config).await?;

    println!(
        "checked {} certificate(s): {} notified, {} unreadable, {} dispatch failure(s)",
        stats.checked, stats.notified, stats.unreadable, stats.dispatch_failures
    );

    if stats.dispatch_failures > 0 {
        anyhow::bail!("{} notification(s) could not be delivered", stats.dispatch_failures);
    }
    Ok(())
}

fn add_certificate(
    config_path: &Path,
    target: &str,
    label: Option<String>,
    threshold_days: Option<i64>,
) -> Result<()> {
    let mut config = load_config(config_path)?;

    let mut descriptor = CertificateDescriptor::new(parse_target(target)?);
    if let Some(label) = label {
        descriptor = descriptor.with_label(label);
    }
    if let Some(days) = threshold_days {
        if days <= 0 {
            anyhow::bail!("threshold must be a positive number of days");
        }
        descriptor = descriptor.with_threshold_days(days);
    }

    let id = descriptor.id.clone();
    config.certificates.add(descriptor)?;
    config.save_to_file(config_path)?;

    println!("✓ Now monitoring {}", id.cyan());
    Ok(())
}

fn remove_certificate(config_path: &Path, id: &str) -> Result<()> {
    let mut config = load_config(config_path)?;
    config.certificates.remove(id)?;
    config.save_to_file(config_path)?;

    println!("✓ Stopped monitoring {}", id.cyan());
    Ok(())
}

fn list_certificates(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    if config.certificates.is_empty() {
        println!("No certificates configured.");
        return Ok(());
    }

    println!("{}", "Monitored certificates:".bold());
    for descriptor in &config.certificates {
        let threshold = descriptor
            .threshold_days
            .unwrap_or(config.watch.threshold_days);
        println!(
            "  {} {} (warn at {} days)",
            descriptor.id.cyan(),
            descriptor.display_label().dimmed(),
            threshold
        );
    }
    Ok(())
}

fn set_webhook(config_path: &Path, url: String) -> Result<()> {
    let parsed = reqwest::Url::parse(&url)
        .map_err(|e| anyhow::anyhow!("invalid webhook URL {}: {}", url, e))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("webhook URL must use http or https");
    }

    let mut config = load_config(config_path)?;
    config.set_webhook_url(url);
    config.save_to_file(config_path)?;

    println!("✓ Webhook URL updated");
    Ok(())
}

fn set_threshold(config_path: &Path, days: i64) -> Result<()> {
    if days <= 0 {
        anyhow::bail!("threshold must be a positive number of days");
    }

    let mut config = load_config(config_path)?;
    config.watch.threshold_days = days;
    config.save_to_file(config_path)?;

    println!("✓ Warning threshold set to {} days", days);
    Ok(())
}

async fn test_webhook(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let webhook = config
        .watch
        .webhook
        .ok_or_else(|| anyhow::anyhow!("no webhook configured; run `certwatch set-webhook` first"))?;

    let dispatcher = WebhookDispatcher::new(webhook)?;
    match dispatcher.send_test().await {
        certwatch::dispatcher::DispatchResult::Success { attempts } => {
            println!("✓ Test notification delivered (attempts: {})", attempts);
            Ok(())
        }
        certwatch::dispatcher::DispatchResult::Failure { attempts, error } => {
            anyhow::bail!("test notification failed after {} attempt(s): {}", attempts, error)
        }
    }
}

fn init_config(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        anyhow::bail!("config file {} already exists", config_path.display());
    }

    Config::default().save_to_file(config_path)?;
    println!("✓ Wrote default configuration to {}", config_path.display());
    Ok(())
}

fn load_config(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        anyhow::bail!(
            "config file {} not found; run `certwatch init-config` first",
            config_path.display()
        );
    }
    Config::from_file(config_path)
}
