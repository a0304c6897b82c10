//! CLI tool for managing proxy hosts and rules
//!
//! Usage:
//!   rustpac-admin host add <host> <port> [--type SOCKS] [--name <name>] [--id <id>]
//!   rustpac-admin host delete <id>
//!   rustpac-admin host list [--json]
//!   rustpac-admin rule set <pattern> [host-id...]
//!   rustpac-admin rule delete <pattern> | --id <id>
//!   rustpac-admin rule list [--json]
//!   rustpac-admin pac [--format embedded|static]
//!   rustpac-admin resolve <host> [--url <url>]

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use rustpac::{pac, resolver, DatabaseManager, HostInput, PacFormat, ProxyType, RuleInput};
use std::path::PathBuf;

/// CLI tool for managing PAC hosts and rules
#[derive(Parser, Debug)]
#[command(name = "rustpac-admin")]
#[command(author = "RustPac Contributors")]
#[command(version = "1.0.0")]
#[command(about = "Manage proxy hosts and rules for RustPac")]
struct Args {
    /// Database path
    #[arg(long, env = "DB_PATH", default_value = "./data/pac.db")]
    db_path: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage proxy hosts
    Host {
        #[command(subcommand)]
        action: HostAction,
    },

    /// Manage domain rules
    Rule {
        #[command(subcommand)]
        action: RuleAction,
    },

    /// Print the generated PAC file
    Pac {
        /// Output format: embedded or static
        #[arg(short = 'f', long, default_value = "embedded")]
        format: String,
    },

    /// Show the directives a host resolves to
    Resolve {
        /// Host name being browsed
        host: String,

        /// Full URL (informational only)
        #[arg(long, default_value = "")]
        url: String,
    },
}

#[derive(Subcommand, Debug)]
enum HostAction {
    /// Add a host, or replace one when --id is given
    Add {
        /// Proxy host name or IP
        host: String,

        /// Proxy port
        port: u32,

        /// Proxy type (SOCKS, HTTP, HTTPS, PROXY)
        #[arg(short = 't', long = "type")]
        proxy_type: Option<ProxyType>,

        /// Display name
        #[arg(short = 'n', long)]
        name: Option<String>,

        /// Id of the host to replace
        #[arg(long)]
        id: Option<u32>,
    },

    /// Delete a host
    Delete {
        /// Host id
        id: u32,
    },

    /// List all hosts
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum RuleAction {
    /// Create a rule or replace its host ids
    Set {
        /// Exact host name or *.suffix pattern
        pattern: String,

        /// Host ids in preference order
        host_ids: Vec<u32>,
    },

    /// Delete a rule by pattern or by id
    Delete {
        /// Rule pattern
        #[arg(required_unless_present = "id", conflicts_with = "id")]
        pattern: Option<String>,

        /// Rule id
        #[arg(long)]
        id: Option<i64>,
    },

    /// List all rules in evaluation order
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let db = DatabaseManager::new(&args.db_path)?;

    match args.command {
        Commands::Host { action } => run_host(&db, action)?,
        Commands::Rule { action } => run_rule(&db, action)?,

        Commands::Pac { format } => {
            let format = PacFormat::from_name(&format)
                .ok_or_else(|| anyhow!("unknown PAC format '{}', expected embedded or static", format))?;
            let config = db.load_config()?;
            print!("{}", pac::render(&config, format)?);
        }

        Commands::Resolve { host, url } => {
            let config = db.load_config()?;
            println!("{}", resolver::resolve(&config, &url, &host));
        }
    }

    Ok(())
}

fn run_host(db: &DatabaseManager, action: HostAction) -> Result<()> {
    match action {
        HostAction::Add {
            host,
            port,
            proxy_type,
            name,
            id,
        } => {
            let host = db.upsert_host(&HostInput {
                id,
                name,
                host,
                port,
                proxy_type,
            })?;

            println!("Saved host:");
            print_host(&host);
        }

        HostAction::Delete { id } => {
            db.delete_host(id)?;
            println!("Deleted host {}", id);
        }

        HostAction::List { json } => {
            let hosts = db.list_hosts()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&hosts)?);
                return Ok(());
            }

            if hosts.is_empty() {
                println!("No hosts found");
                return Ok(());
            }

            println!("{:<6} {:<8} {:<40} {:<6} {:<20}", "ID", "TYPE", "HOST", "PORT", "NAME");
            println!("{}", "-".repeat(84));

            for host in &hosts {
                println!(
                    "{:<6} {:<8} {:<40} {:<6} {:<20}",
                    host.id,
                    host.proxy_type.unwrap_or_default(),
                    host.host,
                    host.port,
                    host.name.as_deref().unwrap_or("")
                );
            }

            println!("\nTotal: {} host(s)", hosts.len());
        }
    }

    Ok(())
}

fn run_rule(db: &DatabaseManager, action: RuleAction) -> Result<()> {
    match action {
        RuleAction::Set { pattern, host_ids } => {
            let rule = RuleInput {
                pattern,
                host_ids: serde_json::json!(host_ids),
            }
            .into_rule()?;
            let rule = db.upsert_rule(&rule)?;
            println!("Saved rule {} -> {:?}", rule.pattern, rule.host_ids);
        }

        RuleAction::Delete { pattern, id } => match (pattern, id) {
            (_, Some(id)) => {
                db.delete_rule_by_id(id)?;
                println!("Deleted rule #{}", id);
            }
            (Some(pattern), None) => {
                db.delete_rule(&pattern)?;
                println!("Deleted rule {}", pattern);
            }
            (None, None) => return Err(anyhow!("either a pattern or --id is required")),
        },

        RuleAction::List { json } => {
            let rules = db.list_rule_records()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&rules)?);
                return Ok(());
            }

            if rules.is_empty() {
                println!("No rules found");
                return Ok(());
            }

            println!("{:<6} {:<40} {:<30}", "ID", "PATTERN", "HOST IDS");
            println!("{}", "-".repeat(78));

            for rule in &rules {
                let ids: Vec<String> = rule.host_ids.iter().map(|id| id.to_string()).collect();
                println!("{:<6} {:<40} {:<30}", rule.id, rule.pattern, ids.join(","));
            }

            println!("\nTotal: {} rule(s)", rules.len());
        }
    }

    Ok(())
}

fn print_host(host: &rustpac::Host) {
    println!("  ID:    {}", host.id);
    if let Some(ref name) = host.name {
        println!("  Name:  {}", name);
    }
    println!("  Type:  {}", host.proxy_type.unwrap_or_default());
    println!("  Host:  {}", host.host);
    println!("  Port:  {}", host.port);
}
