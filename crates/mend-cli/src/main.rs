//! mend CLI - additive schema reconciliation for Postgres, MySQL and SQLite.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use mend::{EngineExt, LogicalField, LogicalSchema, LogicalSchemaProvider, Reconciler};
use mend_config::{Config, ConfigError};
use owo_colors::OwoColorize;
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mend")]
#[command(about = "Bring a database in line with a logical schema, additively")]
#[command(version)]
struct Cli {
    /// Path to the config file [default: search for .config/mend.toml]
    #[arg(long, global = true)]
    config: Option<Utf8PathBuf>,

    /// Database connection URL (overrides the config file)
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the merged logical schema
    Schema,

    /// Compare the logical schema with the database
    Diff,

    /// Print the migration plan as an SQL script, without running it
    Sql,

    /// Apply the migration plan
    Migrate {
        /// Don't ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Mend(#[from] mend::Error),

    #[error(transparent)]
    Schema(#[from] mend::SchemaError),

    #[error("no database URL: pass --database-url, set DATABASE_URL, or set database.url in the config")]
    NoDatabaseUrl,

    #[error("failed to read confirmation: {0}")]
    Stdin(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mend=info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let (config, config_path) = match &cli.config {
        Some(path) => (mend_config::load_file(path)?, path.clone()),
        None => mend_config::load()?,
    };
    tracing::debug!("loaded config from {}", config_path);

    match cli.command {
        Commands::Schema => {
            print_schema(&config.logical_schema()?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Diff => {
            let reconciler = connect(cli.database_url.as_deref(), &config).await?;
            let prepared = reconciler.prepare(&config).await?;
            print!("{}", prepared.diff);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Sql => {
            let reconciler = connect(cli.database_url.as_deref(), &config).await?;
            let prepared = reconciler.prepare(&config).await?;
            for warning in prepared.warnings() {
                eprintln!("{} {}", "warning:".yellow().bold(), warning);
            }
            if prepared.is_empty() {
                eprintln!("{}", "Schema is up to date.".green());
            } else {
                let ddl = prepared.plan.engine.ddl();
                print!("{}", prepared.plan.to_sql(ddl));
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Migrate { yes } => {
            let reconciler = connect(cli.database_url.as_deref(), &config).await?;
            let prepared = reconciler.prepare(&config).await?;
            for warning in prepared.warnings() {
                println!("{} {}", "warning:".yellow().bold(), warning);
            }
            if prepared.is_empty() {
                println!("{}", "Schema is up to date.".green());
                return Ok(ExitCode::SUCCESS);
            }

            print!("{}", prepared.plan);
            if !yes && !confirm("Apply these changes?").await? {
                println!("Aborted.");
                return Ok(ExitCode::SUCCESS);
            }

            let report = reconciler.apply(prepared).await;
            if report.is_success() {
                print!("{}", report.execution.green());
                Ok(ExitCode::SUCCESS)
            } else {
                print!("{}", report.execution.red());
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

async fn connect(database_url: Option<&str>, config: &Config) -> Result<Reconciler, CliError> {
    let url = database_url
        .or(config.database.url.as_deref())
        .ok_or(CliError::NoDatabaseUrl)?;
    eprintln!("{} {}", "database:".dimmed(), mask_password(url));
    Ok(Reconciler::connect(url, config.database.max_concurrency).await?)
}

async fn confirm(prompt: &str) -> Result<bool, CliError> {
    println!("{} [y/N]", prompt.bold());
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn print_schema(schema: &LogicalSchema) {
    if schema.is_empty() {
        println!("No tables defined.");
        return;
    }
    for table in schema.iter_tables() {
        println!("{}", table.name.bold());
        for field in table.fields.values() {
            println!("  {}", describe_field(field));
        }
    }
    for conflict in &schema.conflicts {
        println!("{} {}", "warning:".yellow().bold(), conflict);
    }
}

fn describe_field(field: &LogicalField) -> String {
    let mut out = format!("{}: {}", field.name, field.field_type.cyan());
    if field.primary_key {
        out.push_str(" primary key");
    } else if !field.required {
        out.push_str(&format!(" {}", "(optional)".dimmed()));
    }
    if field.unique {
        out.push_str(" unique");
    }
    if let Some(reference) = &field.reference {
        out.push_str(&format!(" -> {}", reference));
    }
    out
}

/// Replace the password in a connection URL with `***`.
fn mask_password(url: &str) -> String {
    if let Some(start) = url.find("://")
        && let Some(at) = url.rfind('@')
        && at > start
    {
        let credentials = &url[start + 3..at];
        if let Some(colon) = credentials.find(':') {
            return format!(
                "{}{}:***{}",
                &url[..start + 3],
                &credentials[..colon],
                &url[at..]
            );
        }
    }
    url.to_string()
}
