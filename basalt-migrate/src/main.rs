//! Basalt migration CLI
//!
//! Command-line interface for managing SurrealDB migrations with the Basalt
//! engine. Connection settings come from flags, a `.env` file, `BASALT_*`
//! environment variables or `config/basalt.toml`, in that order of
//! precedence.

use anyhow::Result;
use basalt::{
    ConnectionSettings, Direction, ExecutionReport, FileOutcome, Migrator, MigratorOptions,
    Operation, RollbackValidation, StatusReport,
};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "basalt-migrate")]
#[command(about = "SurrealDB migration management tool")]
#[command(version = "0.1.0")]
struct Cli {
    /// SurrealDB HTTP endpoint, e.g. http://localhost:8000
    #[arg(long)]
    url: Option<String>,

    /// Database user
    #[arg(long)]
    user: Option<String>,

    /// Database password
    #[arg(long)]
    pass: Option<String>,

    /// Namespace to connect to
    #[arg(long)]
    ns: Option<String>,

    /// Database to connect to
    #[arg(long)]
    db: Option<String>,

    /// Migrations root directory
    #[arg(long, default_value = "migrations")]
    dir: PathBuf,

    /// Override for the history table schema definition
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Explicit manifest path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show per-module migration status
    Status {
        /// Module patterns (number, name or identifier); default: all modules
        patterns: Vec<String>,
    },

    /// List migrations that would run
    Pending {
        /// Module patterns; default: all modules
        patterns: Vec<String>,

        /// Direction to inspect
        #[arg(long, default_value = "up")]
        direction: String,

        /// Include files regardless of their current state
        #[arg(long)]
        force: bool,
    },

    /// Apply pending migrations
    Migrate {
        /// Module patterns; default: all modules
        patterns: Vec<String>,

        /// Filename patterns narrowing the batch
        #[arg(long = "file")]
        files: Vec<String>,

        /// Bypass applicability and lock gates
        #[arg(long)]
        force: bool,

        /// Read everything, write nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Roll back applied migrations
    Rollback {
        /// Module patterns; default: all modules
        patterns: Vec<String>,

        /// Filename patterns narrowing the batch
        #[arg(long = "file")]
        files: Vec<String>,

        /// Bypass applicability, lock and safety gates
        #[arg(long)]
        force: bool,

        /// Read everything, write nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Check whether modules can be rolled back safely
    CheckRollback {
        /// Module patterns; default: all modules
        patterns: Vec<String>,

        /// Report an override verdict instead of a rejection
        #[arg(long)]
        force: bool,
    },

    /// Wipe the persisted migration history
    Reset {
        /// Confirm the wipe
        #[arg(long)]
        yes: bool,
    },
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let (force, dry_run) = match &cli.command {
        Commands::Pending { force, .. } => (*force, false),
        Commands::Migrate { force, dry_run, .. } | Commands::Rollback { force, dry_run, .. } => {
            (*force, *dry_run)
        }
        Commands::CheckRollback { force, .. } => (*force, false),
        _ => (false, false),
    };

    let options = MigratorOptions {
        connection: ConnectionSettings {
            url: cli.url.clone(),
            username: cli.user.clone(),
            password: cli.pass.clone(),
            namespace: cli.ns.clone(),
            database: cli.db.clone(),
        },
        migrations_dir: cli.dir.clone(),
        schema_path: cli.schema.clone(),
        config_path: cli.config.clone(),
        force,
        dry_run,
    };

    let mut migrator = Migrator::new(options);
    if let Err(e) = migrator.initialize() {
        eprintln!("{} {}", "error:".red().bold(), e);
        process::exit(1);
    }

    let result = run(&migrator, &cli.command);

    // Always release the connection, whichever path we took
    if let Err(e) = migrator.close() {
        eprintln!("{} failed to close connection: {}", "warning:".yellow(), e);
    }

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            process::exit(1);
        }
    }
}

fn run(migrator: &Migrator, command: &Commands) -> Result<i32> {
    match command {
        Commands::Status { patterns } => handle_status(migrator, patterns),
        Commands::Pending {
            patterns,
            direction,
            ..
        } => handle_pending(migrator, patterns, direction),
        Commands::Migrate {
            patterns, files, ..
        } => handle_execute(migrator, patterns, files, Operation::Migrate),
        Commands::Rollback {
            patterns, files, ..
        } => handle_execute(migrator, patterns, files, Operation::Rollback),
        Commands::CheckRollback { patterns, .. } => handle_check_rollback(migrator, patterns),
        Commands::Reset { yes } => handle_reset(migrator, *yes),
    }
}

fn targets(patterns: &[String]) -> Option<&[String]> {
    if patterns.is_empty() {
        None
    } else {
        Some(patterns)
    }
}

fn handle_status(migrator: &Migrator, patterns: &[String]) -> Result<i32> {
    let report: StatusReport = migrator.status(targets(patterns))?;

    println!("\n{}\n", "Migration status".bold());
    for module in &report.modules {
        let state = if module.pending == 0 {
            "up to date".green()
        } else {
            format!("{} pending", module.pending).yellow()
        };
        let lock = if module.locked {
            " [locked]".red().to_string()
        } else {
            String::new()
        };
        println!(
            "  {:<24} {:>3} applied  {}{}",
            module.module, module.applied, state, lock
        );
        if let Some(at) = module.last_applied_at {
            println!("      last applied {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        if !module.dependencies.is_empty() {
            println!("      depends on {}", module.dependencies.join(", "));
        }
    }
    println!(
        "\n{} applied, {} pending",
        report.total_applied, report.total_pending
    );

    Ok(0)
}

fn handle_pending(migrator: &Migrator, patterns: &[String], direction: &str) -> Result<i32> {
    let direction: Direction = direction.parse()?;
    let pending = migrator.find_pending(targets(patterns), direction)?;

    if pending.is_empty() {
        println!("No {} migrations pending", direction);
        return Ok(0);
    }

    println!("{} pending {} migration(s):", pending.len(), direction);
    for script in &pending {
        println!("  {}  {}/{}", "→".cyan(), script.module, script.filename);
    }
    Ok(0)
}

fn handle_execute(
    migrator: &Migrator,
    patterns: &[String],
    files: &[String],
    operation: Operation,
) -> Result<i32> {
    let file_patterns = if files.is_empty() { None } else { Some(files) };
    let report = migrator.execute(targets(patterns), operation, file_patterns)?;
    print_report(&report, operation);
    Ok(if report.succeeded() { 0 } else { 1 })
}

fn print_report(report: &ExecutionReport, operation: Operation) {
    for result in &report.results {
        match &result.outcome {
            FileOutcome::Succeeded { duration_ms } => println!(
                "  {} {}/{} ({}ms)",
                "✓".green(),
                result.module,
                result.filename,
                duration_ms
            ),
            FileOutcome::Skipped { reason } => println!(
                "  {} {}/{}: {}",
                "↷".yellow(),
                result.module,
                result.filename,
                reason
            ),
            FileOutcome::Failed { error } => println!(
                "  {} {}/{}: {}",
                "✗".red(),
                result.module,
                result.filename,
                error
            ),
        }
    }

    let verb = match operation {
        Operation::Migrate => "applied",
        Operation::Rollback => "rolled back",
    };
    let summary = format!(
        "{} {} migration(s), {} skipped",
        verb, report.processed, report.skipped
    );
    if report.dry_run {
        println!("\n{} (dry run)", summary.cyan());
    } else if report.succeeded() {
        println!("\n{}", summary.green());
    } else {
        println!("\n{}", format!("{}, with failures", summary).red());
    }
}

fn handle_check_rollback(migrator: &Migrator, patterns: &[String]) -> Result<i32> {
    let validation: RollbackValidation = migrator.validate_rollback(targets(patterns))?;

    for warning in &validation.warnings {
        println!("  {} {}", "!".yellow(), warning);
    }
    if validation.can_rollback {
        if validation.forced {
            println!("{}", "Rollback allowed (forced override)".yellow());
        } else {
            println!("{}", "Rollback is safe".green());
        }
        Ok(0)
    } else {
        println!(
            "{} blocked by: {}",
            "Rollback is not safe;".red(),
            validation.blocking_modules.join(", ")
        );
        Ok(1)
    }
}

fn handle_reset(migrator: &Migrator, yes: bool) -> Result<i32> {
    if !yes {
        eprintln!("Refusing to wipe migration history without --yes");
        return Ok(1);
    }
    migrator.reset_history()?;
    println!("{}", "Migration history wiped".yellow());
    Ok(0)
}
