use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use mailprobe_lib::{ProbeConfig, Validator};
use tracing_subscriber::EnvFilter;

mod args;
#[cfg(feature = "with-csv")]
mod bulk;
mod output;

use args::{Cli, Commands, require_sender};

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn validator(config: ProbeConfig) -> Result<Validator> {
    Validator::new(config).context("initialise validator")
}

fn run_validate(config: ProbeConfig, email: &str, format: &str, deadline_ms: Option<u64>) -> Result<bool> {
    require_sender(&config)?;
    let validator = validator(config)?;
    let verdict = match deadline_ms {
        Some(ms) => Arc::new(validator).validate_with_deadline(email, Duration::from_millis(ms)),
        None => validator.validate(email),
    };
    output::write_verdict(email, &verdict, format)?;
    Ok(verdict.is_valid())
}

fn run_servers(config: ProbeConfig, domain: Option<&str>, recipient: Option<&str>) -> Result<bool> {
    let validator = validator(config)?;
    let servers = match (domain, recipient) {
        (Some(domain), _) => validator.mail_servers(domain),
        (None, Some(email)) => validator.mail_servers_for_recipient(email),
        (None, None) => bail!("pass --domain or --recipient"),
    }
    .context("list mail servers")?;
    output::write_servers(&servers);
    Ok(true)
}

#[cfg(feature = "with-csv")]
fn run_bulk(config: ProbeConfig, file: &std::path::Path, out: Option<&std::path::Path>) -> Result<bool> {
    require_sender(&config)?;
    let validator = validator(config)?;
    bulk::run(&validator, file, out)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let Some(cmd) = &cli.cmd else {
        Cli::clap_command().print_help()?;
        println!();
        return Ok(());
    };
    let config = cli.probe_config()?;

    let all_valid = match cmd {
        Commands::Validate {
            email,
            format,
            deadline_ms,
        } => run_validate(config, email, format, *deadline_ms)?,
        Commands::Servers { domain, recipient } => {
            run_servers(config, domain.as_deref(), recipient.as_deref())?
        }
        #[cfg(feature = "with-csv")]
        Commands::Bulk { file, out } => run_bulk(config, file, out.as_deref())?,
    };

    // codes de sortie : 0 OK, 2 invalids, 1 fatal
    if !all_valid {
        std::process::exit(2);
    }
    Ok(())
}
