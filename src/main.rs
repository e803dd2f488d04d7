//! rulekeeper - command-line front end for a script-driven firewall backend
//!
//! Every command is one short transaction against the backend directory:
//! validate input, call the backend script, append an audit line, print the
//! result.
//!
//! # Usage
//!
//! ```bash
//! rulekeeper list                                   # Show current rules
//! rulekeeper add block --ip 10.0.0.5 --port 22      # Block SSH from a host
//! rulekeeper delete 1                               # Delete rule #1 (asks first)
//! rulekeeper check --ip 10.0.0.5 --protocol tcp     # Ask the backend about traffic
//! rulekeeper audit --count 50                       # Recent audit entries
//! rulekeeper config --init                          # Write default config.json
//! ```

use clap::{Parser, Subcommand};
use rulekeeper::config::{self, AppConfig};
use rulekeeper::core::store::RuleStore;
use rulekeeper::{Error, Rule, RuleInput, RuleManager, TrafficQuery, TrafficReport};
use std::path::PathBuf;
use std::process::ExitCode;

shadow_rs::shadow!(build);

const LONG_VERSION: &str = shadow_rs::formatcp!(
    "{} (commit {}, built {})",
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME
);

type CliResult = std::result::Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "rulekeeper")]
#[command(about = "Validate, audit and apply firewall rules through backend scripts", long_about = None)]
#[command(version, long_version = LONG_VERSION)]
struct Cli {
    /// Config file (default: XDG config dir/config.json)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Directory holding the backend scripts and rule document
    #[arg(long, global = true, value_name = "DIR")]
    base_dir: Option<PathBuf>,
    /// Kill backend calls running longer than this
    #[arg(long, global = true, value_name = "SECONDS")]
    timeout: Option<u64>,
    /// Print debug logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current rules
    List,
    /// Add a rule
    Add {
        /// allow or block
        action: String,
        /// Source IPv4 address (omit for any)
        #[arg(long, default_value = "")]
        ip: String,
        /// Port number (omit for any)
        #[arg(long, default_value = "")]
        port: String,
        /// tcp, udp or all
        #[arg(long, default_value = "tcp")]
        protocol: String,
    },
    /// Delete the rule at INDEX (as shown by `list`)
    Delete {
        #[arg(allow_negative_numbers = true)]
        index: i64,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Ask the backend to export the current rules
    ExportRules,
    /// Ask the backend to export its logs
    ExportLogs,
    /// Show backend statistics
    Stats,
    /// Ask the backend how it would treat some traffic
    Check {
        #[arg(long, default_value = "")]
        ip: String,
        #[arg(long, default_value = "")]
        port: String,
        #[arg(long, default_value = "all")]
        protocol: String,
    },
    /// Show recent audit log entries, newest first
    Audit {
        #[arg(short, long, default_value_t = 20)]
        count: usize,
    },
    /// Show the effective configuration
    Config {
        /// Write the default config file and an empty rule document
        #[arg(long)]
        init: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = rulekeeper::utils::ensure_dirs() {
        tracing::warn!("Failed to create application directories: {e}");
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to create Tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(e.as_ref());
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();
}

fn report_error(err: &(dyn std::error::Error + 'static)) {
    match err.downcast_ref::<Error>() {
        Some(e) => {
            let translation = e.translate();
            eprintln!("Error: {}", translation.user_message);
            if translation.user_message != e.to_string() {
                eprintln!("  ({e})");
            }
            for suggestion in &translation.suggestions {
                eprintln!("  • {suggestion}");
            }
        }
        None => eprintln!("Error: {err}"),
    }
}

async fn run(cli: Cli) -> CliResult {
    let config_path = match cli.config {
        Some(path) => path,
        None => config::default_config_path().ok_or("cannot determine the config directory")?,
    };

    let mut config = config::load_config(&config_path).await?;
    if let Some(base_dir) = cli.base_dir {
        config.base_dir = base_dir;
    }
    if cli.timeout.is_some() {
        config.backend_timeout_secs = cli.timeout;
    }
    tracing::debug!(
        "rulekeeper {} using {} (base dir {})",
        LONG_VERSION,
        config_path.display(),
        config.base_dir.display()
    );

    let manager = RuleManager::from_config(&config);

    match cli.command {
        Commands::List => {
            let rules = manager.list_rules().await?;
            print_rules(&rules);
        }
        Commands::Add {
            action,
            ip,
            port,
            protocol,
        } => {
            let output = manager
                .add_rule(&RuleInput::new(&action, &ip, &port, &protocol))
                .await?;
            print_output("Rule added.", &output);
        }
        Commands::Delete { index, yes } => {
            let rules = manager.list_rules().await?;
            let shown = usize::try_from(index).ok().and_then(|i| rules.get(i));

            // Out-of-range indices go straight through so the attempt is audited
            if let Some(rule) = shown
                && !yes
            {
                println!("Delete rule #{index}: {}", describe(rule));
                if !confirm("Are you sure? [y/n] ")? {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            let output = manager.delete_rule(index, shown).await?;
            print_output("Rule deleted.", &output);
        }
        Commands::ExportRules => {
            let output = manager.export_rules().await?;
            print_output("Rules exported.", &output);
        }
        Commands::ExportLogs => {
            let output = manager.export_logs().await?;
            print_output("Logs exported.", &output);
        }
        Commands::Stats => {
            let output = manager.show_stats().await?;
            print_output("No statistics returned.", &output);
        }
        Commands::Check { ip, port, protocol } => {
            let query = TrafficQuery { ip, port, protocol };
            let report = manager.check_traffic(&query).await?;
            println!(
                "Traffic Result for IP: {}, Port: {}, Protocol: {}:",
                or_any(&query.ip),
                or_any(&query.port),
                or_any(&query.protocol).to_uppercase()
            );
            match report {
                TrafficReport::NoData => println!("No output returned."),
                TrafficReport::Verdict(text) => println!("{text}"),
            }
        }
        Commands::Audit { count } => {
            let path = manager.audit_log().path();
            let lines = match manager.audit_log().read_recent(count).await {
                Ok(lines) => lines,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
                Err(e) => return Err(format!("cannot read {}: {e}", path.display()).into()),
            };
            if lines.is_empty() {
                println!("No audit entries in {}", path.display());
            }
            for line in lines {
                println!("{line}");
            }
        }
        Commands::Config { init } => {
            if init {
                init_config(&config_path, &config).await?;
            } else {
                print_config(&config_path, &config)?;
            }
        }
    }

    Ok(())
}

fn print_rules(rules: &[Rule]) {
    if rules.is_empty() {
        println!("No rules configured.");
        return;
    }

    println!("{:>4}  {:<6}  {:<15}  {:<6}  {:<8}", "#", "Action", "IP", "Port", "Protocol");
    for (index, rule) in rules.iter().enumerate() {
        println!(
            "{:>4}  {:<6}  {:<15}  {:<6}  {:<8}",
            index,
            rule.action.display_name(),
            rule.ip_display(),
            rule.port_display(),
            rule.protocol.display_name()
        );
    }
}

fn describe(rule: &Rule) -> String {
    format!(
        "{} IP {} Port {} {}",
        rule.action.display_name(),
        rule.ip_display(),
        rule.port_display(),
        rule.protocol.display_name()
    )
}

fn print_output(fallback: &str, output: &str) {
    if output.is_empty() {
        println!("{fallback}");
    } else {
        println!("{output}");
    }
}

fn or_any(field: &str) -> &str {
    let field = field.trim();
    if field.is_empty() { "Any" } else { field }
}

/// Waits for a single y/n keypress.
///
/// Refuses (returns `Err`) when stdin is not a terminal, so scripted deletes
/// must pass `--yes` explicitly.
fn confirm(prompt: &str) -> Result<bool, Box<dyn std::error::Error>> {
    use crossterm::event::{self, Event, KeyCode, KeyEventKind};
    use std::io::Write;

    if !nix::unistd::isatty(std::io::stdin()).unwrap_or(false) {
        return Err("stdin is not a terminal; pass --yes to delete without confirmation".into());
    }

    print!("{prompt}");
    std::io::stdout().flush()?;

    crossterm::terminal::enable_raw_mode()?;
    let answer = loop {
        match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => match key.code {
                KeyCode::Char('y' | 'Y') => break Ok(true),
                KeyCode::Char('n' | 'N') | KeyCode::Esc | KeyCode::Enter => break Ok(false),
                _ => {}
            },
            Ok(_) => {}
            Err(e) => break Err(e),
        }
    };
    // Always restore terminal to normal mode
    let _ = crossterm::terminal::disable_raw_mode();
    println!();

    Ok(answer?)
}

async fn init_config(config_path: &std::path::Path, config: &AppConfig) -> CliResult {
    if tokio::fs::try_exists(config_path).await? {
        println!("Config already exists at {}", config_path.display());
    } else {
        if let Some(parent) = config_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        config::save_config(config_path, config).await?;
        println!("Wrote {}", config_path.display());
    }

    tokio::fs::create_dir_all(&config.base_dir).await?;
    let store = RuleStore::new(config.rules_path());
    if store.initialize().await? {
        println!("Created empty rule document {}", store.path().display());
    }
    Ok(())
}

fn print_config(config_path: &std::path::Path, config: &AppConfig) -> CliResult {
    println!("# {}", config_path.display());
    println!("{}", serde_json::to_string_pretty(config)?);
    println!();
    println!("Rule manager script: {}", config.rule_manager_path().display());
    println!("Firewall script:     {}", config.firewall_path().display());
    println!("Logger script:       {}", config.logger_path().display());
    println!("Rule document:       {}", config.rules_path().display());
    println!("Audit log:           {}", config.audit_log_path().display());
    Ok(())
}
