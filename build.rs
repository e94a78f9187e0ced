// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("curator")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Curator Contributors")
        .about("Lifecycle manager for file-based configuration packages")
        .subcommand_required(false)
        .subcommand(
            Command::new("install")
                .about("Install the package into a target root")
                .arg(
                    Arg::new("source")
                        .default_value(".")
                        .help("Path to the source artifact tree"),
                )
                .arg(
                    Arg::new("target")
                        .short('t')
                        .long("target")
                        .value_name("PATH")
                        .help("Target root (overrides CURATOR_TARGET)"),
                ),
        )
        .subcommand(
            Command::new("update")
                .about("Update an existing deployment in place")
                .arg(
                    Arg::new("source")
                        .default_value(".")
                        .help("Path to the source artifact tree"),
                )
                .arg(
                    Arg::new("target")
                        .short('t')
                        .long("target")
                        .value_name("PATH")
                        .help("Target root (overrides CURATOR_TARGET)"),
                ),
        )
        .subcommand(
            Command::new("uninstall")
                .about("Remove the deployed package")
                .arg(
                    Arg::new("target")
                        .short('t')
                        .long("target")
                        .value_name("PATH")
                        .help("Target root (overrides CURATOR_TARGET)"),
                )
                .arg(
                    Arg::new("yes")
                        .short('y')
                        .long("yes")
                        .action(clap::ArgAction::SetTrue)
                        .help("Skip the interactive confirmation"),
                ),
        )
        .subcommand(
            Command::new("version")
                .about("Inspect and manipulate the version marker")
                .subcommand(Command::new("get").about("Print the current version"))
                .subcommand(
                    Command::new("set")
                        .about("Set the version to an exact value")
                        .arg(Arg::new("version").required(true)),
                )
                .subcommand(
                    Command::new("increment")
                        .about("Bump one field (major, minor, patch)")
                        .arg(Arg::new("field").required(true)),
                )
                .subcommand(
                    Command::new("compare")
                        .about("Compare two version strings")
                        .arg(Arg::new("a").required(true))
                        .arg(Arg::new("b").required(true)),
                )
                .subcommand(
                    Command::new("validate")
                        .about("Validate a version string, or the marker file when omitted")
                        .arg(Arg::new("version")),
                )
                .subcommand(Command::new("info").about("Show marker details")),
        )
        .subcommand(
            Command::new("check")
                .about("Check whether changed paths require a version bump")
                .arg(
                    Arg::new("base_ref")
                        .required(true)
                        .help("Base git reference to diff against"),
                )
                .arg(
                    Arg::new("repo")
                        .short('r')
                        .long("repo")
                        .default_value(".")
                        .help("Repository to inspect"),
                )
                .arg(
                    Arg::new("verbose")
                        .short('v')
                        .long("verbose")
                        .action(clap::ArgAction::SetTrue)
                        .help("List every classified path"),
                )
                .arg(
                    Arg::new("machine_readable")
                        .short('m')
                        .long("machine-readable")
                        .action(clap::ArgAction::SetTrue)
                        .help("Emit key=value lines for automation"),
                ),
        )
        .subcommand(
            Command::new("workspace")
                .about("Run a workspace lifecycle transition")
                .arg(
                    Arg::new("root")
                        .short('r')
                        .long("root")
                        .default_value("./workspace")
                        .help("Workspace root"),
                )
                .arg(
                    Arg::new("mode")
                        .short('m')
                        .long("mode")
                        .help("Transition mode (first, update, new)"),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer)
        .expect("Failed to render man page");

    let man_path = man_dir.join("curator.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}
