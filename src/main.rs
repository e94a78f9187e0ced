// src/main.rs

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use curator::deploy::update::UpdateOutcome;
use curator::deploy::{
    DeployStore, InstallTransaction, SourceTree, UninstallTransaction, UpdateTransaction,
};
use curator::policy::{check, PatternTable};
use curator::version::{read_marker, write_marker, Field, Version};
use curator::workspace::{Mode, WorkspaceManager};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::info;

/// Environment override for the deployment target root
const TARGET_ENV: &str = "CURATOR_TARGET";
const DEFAULT_TARGET: &str = "./deploy";

#[derive(Parser)]
#[command(name = "curator")]
#[command(author, version, about = "Lifecycle manager for file-based configuration packages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install the package into a target root
    Install {
        /// Path to the source artifact tree
        #[arg(default_value = ".")]
        source: PathBuf,
        /// Target root (overrides CURATOR_TARGET)
        #[arg(short, long)]
        target: Option<PathBuf>,
    },
    /// Update an existing deployment in place
    Update {
        /// Path to the source artifact tree
        #[arg(default_value = ".")]
        source: PathBuf,
        /// Target root (overrides CURATOR_TARGET)
        #[arg(short, long)]
        target: Option<PathBuf>,
    },
    /// Remove the deployed package
    Uninstall {
        /// Target root (overrides CURATOR_TARGET)
        #[arg(short, long)]
        target: Option<PathBuf>,
        /// Skip the interactive confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Inspect and manipulate the version marker
    Version {
        #[command(subcommand)]
        action: VersionCommands,
    },
    /// Check whether changed paths require a version bump
    Check {
        /// Base git reference to diff against
        base_ref: String,
        /// Repository to inspect
        #[arg(short, long, default_value = ".")]
        repo: PathBuf,
        /// List every classified path
        #[arg(short, long)]
        verbose: bool,
        /// Emit key=value lines for automation
        #[arg(short, long)]
        machine_readable: bool,
    },
    /// Run a workspace lifecycle transition
    Workspace {
        /// Workspace root
        #[arg(short, long, default_value = "./workspace")]
        root: PathBuf,
        /// Transition mode (first, update, new); consumed from the flag
        /// file when omitted
        #[arg(short, long)]
        mode: Option<String>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        #[arg(value_parser = ["bash", "zsh", "fish", "powershell"])]
        shell: String,
    },
}

#[derive(Subcommand)]
enum VersionCommands {
    /// Print the current version
    Get {
        /// Marker file path
        #[arg(short, long, default_value = "VERSION")]
        marker: PathBuf,
    },
    /// Set the version to an exact value
    Set {
        version: String,
        #[arg(short, long, default_value = "VERSION")]
        marker: PathBuf,
    },
    /// Bump one field (major, minor, patch)
    Increment {
        field: String,
        #[arg(short, long, default_value = "VERSION")]
        marker: PathBuf,
    },
    /// Compare two version strings
    Compare { a: String, b: String },
    /// Validate a version string, or the marker file when omitted
    Validate {
        version: Option<String>,
        #[arg(short, long, default_value = "VERSION")]
        marker: PathBuf,
    },
    /// Show marker details
    Info {
        #[arg(short, long, default_value = "VERSION")]
        marker: PathBuf,
    },
}

/// Resolve the target root: flag, then environment, then default
fn resolve_target(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| std::env::var_os(TARGET_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TARGET))
}

/// Interactive yes/no prompt; anything but y/yes declines
fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Install { source, target }) => {
            let store = DeployStore::new(resolve_target(target));
            let source = SourceTree::new(&source);

            // marker presence decides which transaction runs
            if store.is_installed() {
                info!("Existing deployment detected, updating instead");
                return run_update(&store, &source);
            }

            let report = InstallTransaction::new(&store, &source).run()?;
            println!(
                "Installed version {} into {}",
                report.version,
                store.root().display()
            );
            for (category, count) in &report.counts {
                println!("  {}: {} file(s)", category, count);
            }
            Ok(())
        }
        Some(Commands::Update { source, target }) => {
            let store = DeployStore::new(resolve_target(target));
            let source = SourceTree::new(&source);
            run_update(&store, &source)
        }
        Some(Commands::Uninstall { target, yes }) => {
            let store = DeployStore::new(resolve_target(target));

            if !store.is_installed() {
                println!("Nothing installed at {}", store.root().display());
                return Ok(());
            }

            let version = store.installed_version()?;
            if !yes
                && !confirm(&format!(
                    "Remove version {} from {}?",
                    version,
                    store.root().display()
                ))?
            {
                println!("Uninstall cancelled.");
                return Ok(());
            }

            let report = UninstallTransaction::new(&store).run()?;
            println!(
                "Removed version {}: {} file(s), {} directory(ies)",
                version, report.removed_files, report.removed_dirs
            );
            Ok(())
        }
        Some(Commands::Version { action }) => run_version(action),
        Some(Commands::Check {
            base_ref,
            repo,
            verbose,
            machine_readable,
        }) => {
            let table = PatternTable::default();
            let report = check::run(&repo, &base_ref, &table)?;

            if machine_readable {
                print!("{}", report.machine_readable());
            } else {
                println!(
                    "Changed paths: {} bump-required, {} exempt, {} unclassified",
                    report.classification.bump_required.len(),
                    report.classification.exempt.len(),
                    report.classification.unclassified.len()
                );
                if verbose {
                    for path in &report.classification.bump_required {
                        println!("  [bump-required] {}", path);
                    }
                    for path in &report.classification.exempt {
                        println!("  [exempt]        {}", path);
                    }
                    for path in &report.classification.unclassified {
                        println!("  [unclassified]  {}", path);
                    }
                }
                println!(
                    "Versions: base {} -> current {}",
                    report.base_version, report.current_version
                );
                println!("Requirement: {}", report.status.as_str());
                for problem in &report.problems {
                    println!("  - {}", problem);
                }
            }

            if report.status.is_failure() {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Commands::Workspace { root, mode }) => {
            let manager = WorkspaceManager::new(&root);
            if let Some(mode) = mode {
                let mode = mode.parse::<Mode>()?;
                manager.set_mode(mode)?;
            }

            let report = manager.transition()?;
            match report.archived {
                Some(id) => println!("Archived current run as {}", id),
                None => println!("Workspace ready ({} transition)", report.mode.as_str()),
            }
            Ok(())
        }
        Some(Commands::Completions { shell }) => {
            let shell = match shell.as_str() {
                "bash" => clap_complete::Shell::Bash,
                "zsh" => clap_complete::Shell::Zsh,
                "fish" => clap_complete::Shell::Fish,
                _ => clap_complete::Shell::PowerShell,
            };
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "curator", &mut io::stdout());
            Ok(())
        }
        None => {
            // No command provided, show help
            println!(
                "Curator Configuration Package Manager v{}",
                env!("CARGO_PKG_VERSION")
            );
            println!("Run 'curator --help' for usage information");
            Ok(())
        }
    }
}

fn run_update(store: &DeployStore, source: &SourceTree) -> Result<()> {
    match UpdateTransaction::new(store, source).run()? {
        UpdateOutcome::Installed(report) => {
            println!(
                "No existing deployment; installed version {} ({} file(s))",
                report.version,
                report.total()
            );
        }
        UpdateOutcome::Updated(report) => {
            println!(
                "Updated {} -> {}: {} file(s) written, {} removed",
                report.from, report.to, report.written, report.removed
            );
            println!(
                "  backup {} kept ({} pruned)",
                report.backup_id, report.pruned_backups
            );
        }
    }
    Ok(())
}

fn run_version(action: VersionCommands) -> Result<()> {
    match action {
        VersionCommands::Get { marker } => {
            println!("{}", read_marker(&marker)?);
            Ok(())
        }
        VersionCommands::Set { version, marker } => {
            let version = Version::parse(&version)?;
            write_marker(&marker, &version)?;
            println!("Set version to {}", version);
            Ok(())
        }
        VersionCommands::Increment { field, marker } => {
            let field: Field = field.parse()?;
            let current = read_marker(&marker)?;
            let next = current.increment(field);
            write_marker(&marker, &next)?;
            println!("{} -> {}", current, next);
            Ok(())
        }
        VersionCommands::Compare { a, b } => {
            let a = Version::parse(&a)?;
            let b = Version::parse(&b)?;
            let word = match a.compare(&b) {
                std::cmp::Ordering::Equal => "EQUAL",
                std::cmp::Ordering::Greater => "GREATER",
                std::cmp::Ordering::Less => "LESS",
            };
            println!("{}", word);
            Ok(())
        }
        VersionCommands::Validate { version, marker } => {
            let result = match version {
                Some(text) => Version::parse(&text),
                None => read_marker(&marker),
            };
            match result {
                Ok(version) => {
                    println!("{} is valid", version);
                    Ok(())
                }
                Err(e) => {
                    eprintln!("invalid: {}", e);
                    std::process::exit(1);
                }
            }
        }
        VersionCommands::Info { marker } => {
            let version = read_marker(&marker)?;
            println!("marker:  {}", marker.display());
            println!("version: {}", version);
            println!("major:   {}", version.major);
            println!("minor:   {}", version.minor);
            println!("patch:   {}", version.patch);
            Ok(())
        }
    }
}
