use std::net::SocketAddr;
#[cfg(feature = "with-csv")]
use std::path::PathBuf;

#[cfg(feature = "with-serde")]
use anyhow::Context;
use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use mailprobe_lib::ProbeConfig;

#[derive(Parser)]
#[command(name = "mailprobe-cli", version)]
/// Vérifie qu'une adresse e-mail existe en interrogeant ses serveurs MX
/// (jusqu'à RCPT TO, aucun message n'est envoyé).
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Option<Commands>,

    /// adresse utilisée pour MAIL FROM
    #[arg(short = 's', long, global = true)]
    pub sender: Option<String>,

    /// résolveur DNS (ip:port)
    #[arg(long, global = true)]
    pub resolver: Option<SocketAddr>,

    /// timeout réseau par opération (ms, 0 = aucun)
    #[arg(long = "timeout", global = true)]
    pub timeout_ms: Option<u64>,

    /// abandonne la tentative si STARTTLS échoue
    #[arg(long, global = true)]
    pub strict_tls: bool,

    /// vérifie les certificats TLS des serveurs
    #[arg(long, global = true)]
    pub verify_certs: bool,

    /// trie les MX par préférence au lieu de l'ordre DNS
    #[arg(long, global = true)]
    pub sort_mx: bool,

    /// nom annoncé dans EHLO/HELO (sinon dérivé de la machine)
    #[arg(long, global = true)]
    pub helo: Option<String>,

    /// filtre de logs (prend le pas sur RUST_LOG)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// configuration JSON de base (les options ci-dessus la surchargent)
    #[cfg(feature = "with-serde")]
    #[arg(long, global = true)]
    pub config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// valide une adresse
    Validate {
        /// adresse e-mail à tester
        email: String,
        /// format de sortie (human|json)
        #[arg(long, default_value = "human")]
        format: String,
        /// délai maximal de la validation complète (ms)
        #[arg(long = "deadline")]
        deadline_ms: Option<u64>,
    },
    /// liste les serveurs MX d'un domaine ou d'une adresse
    Servers {
        /// domaine à interroger
        #[arg(long, conflicts_with = "recipient", required_unless_present = "recipient")]
        domain: Option<String>,
        /// adresse dont on prend le domaine
        #[arg(long)]
        recipient: Option<String>,
    },
    /// valide la colonne `email` d'un fichier CSV (feature `with-csv`)
    #[cfg(feature = "with-csv")]
    Bulk {
        /// fichier CSV avec une colonne `email`
        file: PathBuf,
        /// fichier de sortie (par défaut: réécrit l'entrée)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn clap_command() -> clap::Command {
        <Self as clap::CommandFactory>::command()
    }

    /// Configuration de base (fichier `--config` ou défauts) surchargée par
    /// les options de la ligne de commande.
    pub fn probe_config(&self) -> Result<ProbeConfig> {
        Ok(self.apply_overrides(self.base_config()?))
    }

    #[cfg(feature = "with-serde")]
    fn base_config(&self) -> Result<ProbeConfig> {
        let Some(path) = &self.config else {
            return Ok(ProbeConfig::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    #[cfg(not(feature = "with-serde"))]
    fn base_config(&self) -> Result<ProbeConfig> {
        Ok(ProbeConfig::default())
    }

    fn apply_overrides(&self, mut config: ProbeConfig) -> ProbeConfig {
        if let Some(sender) = &self.sender {
            config.sender = sender.clone();
        }
        if let Some(resolver) = self.resolver {
            config.resolver = resolver;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
            config.dns_timeout_ms = timeout_ms;
        }
        if self.strict_tls {
            config.continue_without_tls = false;
        }
        if self.verify_certs {
            config.accept_invalid_certs = false;
        }
        if self.sort_mx {
            config.sort_mx_by_preference = true;
        }
        if let Some(helo) = &self.helo {
            config.helo_name = Some(helo.clone());
        }
        config
    }
}

/// Les commandes qui ouvrent une session SMTP ont besoin d'un expéditeur.
pub fn require_sender(config: &ProbeConfig) -> Result<()> {
    if config.sender.trim().is_empty() {
        bail!("missing sender: pass --sender <address> (or \"sender\" in --config)");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("valid arguments")
    }

    #[test]
    fn flags_override_defaults() {
        let cli = parse(&[
            "mailprobe-cli",
            "validate",
            "user@example.com",
            "-s",
            "probe@sender.test",
            "--timeout",
            "0",
            "--strict-tls",
            "--sort-mx",
            "--helo",
            "probe.example.net",
            "--resolver",
            "1.1.1.1:53",
        ]);
        let config = cli.probe_config().expect("config");
        assert_eq!(config.sender, "probe@sender.test");
        assert_eq!(config.timeout(), None);
        assert_eq!(config.dns_timeout(), None);
        assert!(!config.continue_without_tls);
        assert!(config.accept_invalid_certs);
        assert!(config.sort_mx_by_preference);
        assert_eq!(config.helo_override(), Some("probe.example.net"));
        assert_eq!(config.resolver, "1.1.1.1:53".parse().expect("addr"));
    }

    #[test]
    fn defaults_are_kept_without_flags() {
        let cli = parse(&["mailprobe-cli", "servers", "--domain", "example.com"]);
        let config = cli.probe_config().expect("config");
        assert_eq!(config, ProbeConfig::default());
        assert!(require_sender(&config).is_err());
    }

    #[test]
    fn servers_needs_exactly_one_target() {
        assert!(Cli::try_parse_from(["mailprobe-cli", "servers"]).is_err());
        assert!(
            Cli::try_parse_from([
                "mailprobe-cli",
                "servers",
                "--domain",
                "example.com",
                "--recipient",
                "user@example.com",
            ])
            .is_err()
        );
    }

    #[test]
    fn validate_options_are_parsed() {
        let cli = parse(&[
            "mailprobe-cli",
            "validate",
            "user@example.com",
            "--format",
            "json",
            "--deadline",
            "1500",
        ]);
        match cli.cmd {
            Some(Commands::Validate {
                email,
                format,
                deadline_ms,
            }) => {
                assert_eq!(email, "user@example.com");
                assert_eq!(format, "json");
                assert_eq!(deadline_ms, Some(1500));
            }
            _ => panic!("expected validate"),
        }
    }
}
