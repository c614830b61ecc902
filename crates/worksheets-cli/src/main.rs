//! Worksheets CLI - inspect definitions and versioned stores

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use worksheets::prelude::*;

#[derive(Parser)]
#[command(name = "wsheet")]
#[command(author, version, about = "Worksheet definition and store inspection tool")]
struct Cli {
    /// How long to wait on a locked database, in milliseconds
    #[arg(long, global = true, default_value = "5000")]
    busy_timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate a definitions file, then list its fields
    Check {
        /// Definitions source file
        defs: PathBuf,
    },

    /// Create the worksheet tables in a database
    Init {
        /// SQLite database file
        db: PathBuf,
    },

    /// Load a worksheet and print its fields
    Show {
        /// SQLite database file
        db: PathBuf,

        /// Definitions source file
        defs: PathBuf,

        /// Definition name
        name: String,

        /// Worksheet id
        id: Uuid,

        /// Version to load (default: latest)
        #[arg(long)]
        at: Option<i32>,
    },

    /// Print the raw value history of a worksheet
    History {
        /// SQLite database file
        db: PathBuf,

        /// Worksheet id
        id: Uuid,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let busy_timeout = Duration::from_millis(cli.busy_timeout_ms);
    let mut out = io::stdout().lock();

    match cli.command {
        Commands::Check { defs } => check(&mut out, &defs),
        Commands::Init { db } => init(&mut out, &db, busy_timeout),
        Commands::Show {
            db,
            defs,
            name,
            id,
            at,
        } => show(&mut out, &db, busy_timeout, &defs, &name, id, at),
        Commands::History { db, id } => history(&mut out, &db, busy_timeout, id),
    }
}

/// Log to stderr, filtered by `RUST_LOG` (default: warnings only)
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_registry(defs: &Path) -> Result<Registry> {
    let source = std::fs::read_to_string(defs)
        .with_context(|| format!("Failed to read '{}'", defs.display()))?;
    Registry::from_source(&source)
        .with_context(|| format!("Invalid definitions in '{}'", defs.display()))
}

fn open_db(db: &Path, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open(db)
        .with_context(|| format!("Failed to open database '{}'", db.display()))?;
    conn.busy_timeout(busy_timeout)
        .context("Failed to set busy timeout")?;
    debug!(path = %db.display(), "opened database");
    Ok(conn)
}

fn check(out: &mut impl Write, defs: &Path) -> Result<()> {
    let registry = load_registry(defs)?;

    for definition in registry.definitions() {
        writeln!(out, "worksheet {}", definition.name())?;
        for field in definition.business_fields() {
            let mut line = format!(
                "  {}:{} {}",
                field.index(),
                field.name(),
                field.field_type()
            );
            if let Some(expr) = field.computed() {
                line.push_str(&format!(" computed_by {{ {} }}", expr));
            }
            if let Some(expr) = field.constraint() {
                line.push_str(&format!(" constrained_by {{ {} }}", expr));
            }
            writeln!(out, "{}", line)?;
        }
    }

    Ok(())
}

fn init(out: &mut impl Write, db: &Path, busy_timeout: Duration) -> Result<()> {
    let conn = open_db(db, busy_timeout)?;
    schema::init(&conn).context("Failed to create schema")?;
    writeln!(out, "Initialized '{}'", db.display())?;
    Ok(())
}

fn show(
    out: &mut impl Write,
    db: &Path,
    busy_timeout: Duration,
    defs: &Path,
    name: &str,
    id: Uuid,
    at: Option<i32>,
) -> Result<()> {
    let registry = load_registry(defs)?;
    let mut conn = open_db(db, busy_timeout)?;
    let mut tx = conn.transaction()?;
    let mut session = Session::open(&registry, &mut tx);

    let worksheet = match at {
        Some(version) => session.load_at(name, id, version),
        None => session.load(name, id),
    }
    .with_context(|| format!("Failed to load {} {}", name, id))?;

    writeln!(out, "{} {} (version {})", name, id, worksheet.version())?;
    for (field, value) in worksheet.business_values() {
        writeln!(
            out,
            "  {:>3}:{:<16} {:<12} {}",
            field.index().get(),
            field.name(),
            field.field_type().to_string(),
            value
        )?;
    }

    Ok(())
}

fn history(out: &mut impl Write, db: &Path, busy_timeout: Duration, id: Uuid) -> Result<()> {
    let registry = Registry::default();
    let mut conn = open_db(db, busy_timeout)?;
    let mut tx = conn.transaction()?;
    let rows = Session::open(&registry, &mut tx)
        .history(id)
        .with_context(|| format!("Failed to read history of {}", id))?;

    if rows.is_empty() {
        eprintln!("Warning: no history for {}", id);
        return Ok(());
    }

    writeln!(out, "index\tfrom\tto\tvalue")?;
    for row in rows {
        let to = if row.is_open() {
            "open".to_string()
        } else {
            row.to_version.to_string()
        };
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            row.index, row.from_version, to, row.value
        )?;
    }

    Ok(())
}
