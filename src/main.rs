//! Cuff Assembly CLI
//!
//! Usage:
//!   cuff-assembly [OPTIONS] [DESIGNS]
//!
//! Options:
//!   -t, --templates <FILE>  Additional template catalog (repeatable)
//!   --snapshot <FILE>       Write the identifier allocator snapshot (JSON)
//!   --resume <FILE>         Continue numbering from a saved snapshot
//!   --list-templates        List registered templates and their parameters
//!   -v, --verbose           Increase log verbosity (repeatable)
//!   -h, --help              Print help

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use cuff_assembly::logging::{self, LogConfig};
use cuff_assembly::{DesignFile, IdentifierAllocator, Session, TemplateRegistry};

#[derive(Parser)]
#[command(name = "cuff-assembly")]
#[command(about = "Assemble parametric nerve-cuff part instances from design tables")]
struct Cli {
    /// Design file (TOML)
    designs: Option<PathBuf>,

    /// Additional template catalog, loaded after the built-in one
    #[arg(short, long = "templates")]
    templates: Vec<PathBuf>,

    /// Write the identifier allocator snapshot to this file
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Resume identifier numbering from a saved snapshot
    #[arg(long)]
    resume: Option<PathBuf>,

    /// List registered templates and exit
    #[arg(long)]
    list_templates: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(&LogConfig::from_verbosity(cli.verbose));

    let mut registry = match TemplateRegistry::builtin() {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Error loading built-in templates:\n{}", e.render());
            return ExitCode::FAILURE;
        }
    };
    for path in &cli.templates {
        if let Err(e) = registry.load_file(path) {
            eprintln!("Error loading templates '{}':\n{}", path.display(), e.render());
            return ExitCode::FAILURE;
        }
    }

    if cli.list_templates {
        print_templates(&registry);
        return ExitCode::SUCCESS;
    }

    let Some(designs_path) = &cli.designs else {
        eprintln!("Error: no design file given (see --help)");
        return ExitCode::FAILURE;
    };
    let file = match DesignFile::from_file(designs_path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut session = Session::new(registry).with_config(file.assembly.clone());
    if let Some(path) = &cli.resume {
        match IdentifierAllocator::load(path) {
            Ok(ids) => session = session.with_allocator(ids),
            Err(e) => {
                eprintln!("Error resuming from '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        }
    }

    let report = session.run(&file.designs);
    for outcome in &report.outcomes {
        println!(
            "{} [{}]",
            outcome.design,
            outcome.parameter_group.as_deref().unwrap_or("-")
        );
        for id in &outcome.instances {
            let Some(instance) = session.instance(id) else {
                continue;
            };
            println!(
                "  {} {} ({})",
                id,
                instance.pseudonym().unwrap_or(""),
                instance.template().name()
            );
            for selection in instance.selections() {
                println!(
                    "    {:<28} {}{}",
                    selection.label,
                    selection.handle,
                    if selection.keep { "  keep" } else { "" }
                );
            }
        }
        if let Some(e) = &outcome.error {
            println!("  failed: {}", e);
        }
    }

    if let Some(path) = &cli.snapshot {
        if let Err(e) = session.allocator().save(path) {
            error!(path = %path.display(), error = %e, "cannot write snapshot");
            eprintln!("Error writing snapshot '{}': {}", path.display(), e);
            return ExitCode::FAILURE;
        }
    }

    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_templates(registry: &TemplateRegistry) {
    for name in registry.names() {
        let Some(template) = registry.get(name) else {
            continue;
        };
        println!("{}", name);
        for param in template.params().values() {
            println!("    {:<16} = {}", param.name, param.default);
        }
        for selection in template.selections().values() {
            let mut flags = Vec::new();
            if selection.keep {
                flags.push("keep");
            }
            if selection.source {
                flags.push("source");
            }
            println!(
                "    {} {}{}",
                selection.local_id(),
                selection.label,
                if flags.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", flags.join(", "))
                }
            );
        }
    }
}
