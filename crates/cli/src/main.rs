//! LdapMeta command-line management tool.
//!
//! Provides subcommands for generating and validating configuration,
//! inspecting and editing the field-to-LDAP-attribute mapping, and resolving
//! a user's mapped fields against the directory.

mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use ldapmeta_core::config::AppConfig;
use ldapmeta_core::db::Database;
use ldapmeta_core::directory::LdapDirectory;
use ldapmeta_core::mapping::{MappingConfiguration, MappingStore};
use ldapmeta_core::resolver::{AttributeResolver, ResolvedUserData, UserMetaWriter};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// LdapMeta command-line management tool.
#[derive(Parser, Debug)]
#[command(
    name = "ldapmeta",
    version,
    about = "Map user-meta fields to LDAP attributes and resolve them"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "/etc/ldapmeta/config.toml")]
    config: PathBuf,

    /// Override the log level from the config file (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./ldapmeta.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,

    /// List the user-meta fields that can be mapped.
    Fields,

    /// Inspect or edit the field mapping.
    Mapping {
        #[command(subcommand)]
        action: MappingAction,
    },

    /// Resolve a user's mapped fields from the directory.
    Resolve {
        /// Directory username for the base search.
        username: String,

        /// Local user ID to write resolved values to.
        #[arg(long, requires = "write")]
        user_id: Option<i64>,

        /// Write resolved values into the user-meta store.
        #[arg(long, requires = "user_id")]
        write: bool,
    },
}

#[derive(Subcommand, Debug)]
enum MappingAction {
    /// Show the current mapping.
    Show,

    /// Apply a submitted mapping form (JSON object) and save it.
    Import {
        /// JSON file with `ldap_alt_dn_<field>` / `ldap_attr_<field>` keys.
        form: PathBuf,

        /// Drop entries for fields no longer in use before saving.
        #[arg(long)]
        prune: bool,

        /// Show the result without saving it.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the stored mapping as JSON.
    Export,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Flag wins over the config file; an unreadable config falls back to warn.
    let level = cli
        .log_level
        .clone()
        .or_else(|| {
            AppConfig::load_from_file(&cli.config)
                .ok()
                .map(|c| c.general.log_level)
        })
        .unwrap_or_else(|| "warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .without_time()
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style::error(&format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let command = match cli.command {
        Commands::Init { output } => return cmd_init(&output),
        Commands::Validate => return cmd_validate(&cli.config),
        command => command,
    };

    let config = load_config(&cli.config)?;
    let db = open_database(&config)?;
    let store = MappingStore::with_options(&db, &db, config.mapping.to_options());

    match command {
        Commands::Fields => cmd_fields(&store),
        Commands::Mapping { action } => cmd_mapping(&store, action),
        Commands::Resolve {
            username,
            user_id,
            write,
        } => cmd_resolve(&config, &db, &store, &username, user_id.filter(|_| write)),
        // Handled before the database is opened.
        Commands::Init { .. } | Commands::Validate => Ok(()),
    }
}

type Store<'a> = MappingStore<&'a Database, &'a Database>;

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load_and_resolve(path).context("failed to load configuration file")
}

fn open_database(config: &AppConfig) -> Result<Database> {
    let db = Database::new(&config.general.database).context("failed to open database")?;
    db.initialize().context("failed to initialize database")?;
    Ok(db)
}

/// Read a submitted mapping form from a JSON file.
fn read_form(path: &Path) -> Result<Value> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read form file {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("form file {} is not valid JSON", path.display()))
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, AppConfig::default_toml()).context("failed to write config file")?;

    println!(
        "{}",
        style::success(&format!("Default configuration written to {}", output.display()))
    );
    println!();
    println!("Next steps:");
    println!("  1. Edit the config file with your directory details");
    println!("  2. Set the bind password environment variable, if binding");
    println!("  3. Validate with: ldapmeta validate --config {}", output.display());

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    config.resolve_env_vars()?;
    println!("  [OK] Environment variable references processed");

    if let Err(e) = config.validate() {
        println!("  [FAIL] Validation error: {}", e);
        anyhow::bail!("configuration validation failed");
    }
    println!("  [OK] All required fields are valid");

    println!();
    println!("Configuration summary:");
    println!("  LDAP URL      : {}", config.directory.url);
    println!("  Base DN       : {}", config.directory.base_dn);
    println!(
        "  Bind DN       : {}",
        config.directory.bind_dn.as_deref().unwrap_or("(anonymous)")
    );
    if config.directory.bind_dn.is_some() {
        println!(
            "  Bind password : {}",
            if config.directory.bind_password.is_some() {
                "set"
            } else {
                "NOT SET"
            }
        );
    }
    println!("  User filter   : {}", config.directory.user_filter);
    println!("  Database      : {}", config.general.database.display());
    println!("  Mapping option: {}", config.mapping.option_key);
    println!();
    println!("{}", style::success("Configuration is valid."));

    Ok(())
}

fn cmd_fields(store: &Store<'_>) -> Result<()> {
    let names = store
        .load_field_names()
        .context("failed to load user-meta field names")?;

    if names.is_empty() {
        println!("No mappable user-meta fields found.");
        return Ok(());
    }

    for name in &names {
        println!("{}", name);
    }
    println!();
    println!("{}", style::dim(&format!("{} field(s)", names.len())));
    Ok(())
}

fn cmd_mapping(store: &Store<'_>, action: MappingAction) -> Result<()> {
    match action {
        MappingAction::Show => {
            let config = store.load_mapping().context("failed to load mapping")?;
            print_mapping(&config);
            Ok(())
        }
        MappingAction::Import {
            form,
            prune,
            dry_run,
        } => {
            let form = read_form(&form)?;
            let config = store.load_mapping().context("failed to load mapping")?;
            let mut updated = store
                .apply_submitted_mapping(&config, &form)
                .context("failed to apply submitted mapping")?;
            if prune {
                updated = store
                    .prune_stale(&updated)
                    .context("failed to prune stale mappings")?;
            }

            print_mapping(&updated);
            if dry_run {
                println!("{}", style::warn("Dry run: mapping not saved."));
                return Ok(());
            }

            store.persist(&updated).context("failed to save mapping")?;
            println!("{}", style::success("Mapping saved."));
            Ok(())
        }
        MappingAction::Export => {
            let config = store.load_mapping().context("failed to load mapping")?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn cmd_resolve(
    config: &AppConfig,
    db: &Database,
    store: &Store<'_>,
    username: &str,
    write_to: Option<i64>,
) -> Result<()> {
    let mappings = store.load_mapping().context("failed to load mapping")?;

    let mut directory =
        LdapDirectory::connect(&config.directory).context("failed to connect to directory")?;
    let base_dn = directory.base_dn().to_string();
    let base_result = directory
        .find_user(username)
        .with_context(|| format!("base search for '{}' failed", username))?;
    if base_result.is_empty() {
        anyhow::bail!("no directory entry found for '{}' under {}", username, base_dn);
    }
    debug!(username, dn = ?base_result.first_entry().map(|e| &e.dn), "found base entry");

    let mut data = ResolvedUserData::new();
    let outcome = AttributeResolver::new(&mappings).resolve_into(
        Some(&mut directory),
        &base_dn,
        &base_result,
        &mut data,
    );
    directory.close().context("failed to unbind from directory")?;

    print_resolved(&data);
    if let Err(e) = outcome {
        anyhow::bail!("attribute resolution aborted: {}", e);
    }

    if let Some(user_id) = write_to {
        let written = db
            .write_user_meta(user_id, &data)
            .context("failed to write user meta")?;
        println!(
            "{}",
            style::success(&format!("Wrote {} field(s) for user {}", written, user_id))
        );
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_mapping(config: &MappingConfiguration) {
    if config.is_empty() {
        println!("No fields to map.");
        return;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Field", "LDAP attribute", "Alternate DN"]);

    for (field, mapping) in config {
        let attr_cell = if mapping.is_mapped() {
            Cell::new(&mapping.ldap_attr)
        } else {
            Cell::new("—").fg(comfy_table::Color::DarkGrey)
        };
        table.add_row(vec![Cell::new(field), attr_cell, Cell::new(&mapping.alt_dn)]);
    }

    println!();
    println!("{}", style::header("Field Mapping"));
    println!();
    println!("{table}");
}

fn print_resolved(data: &ResolvedUserData) {
    if data.is_empty() {
        println!("No fields resolved.");
        return;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Field", "Value"]);
    for (field, value) in data {
        table.add_row(vec![Cell::new(field), Cell::new(value)]);
    }

    println!();
    println!("{}", style::header("Resolved Fields"));
    println!();
    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_resolve_with_write() {
        let cli = Cli::try_parse_from([
            "ldapmeta", "resolve", "jdoe", "--user-id", "7", "--write",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Resolve { ref username, user_id: Some(7), write: true } if username == "jdoe"
        ));
    }

    #[test]
    fn test_cli_write_requires_user_id() {
        assert!(Cli::try_parse_from(["ldapmeta", "resolve", "jdoe", "--write"]).is_err());
    }

    #[test]
    fn test_read_form() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("form.json");
        std::fs::write(&path, r#"{"ldap_attr_phone": "mobile"}"#).unwrap();
        let form = read_form(&path).unwrap();
        assert_eq!(form["ldap_attr_phone"], "mobile");

        std::fs::write(&path, "not json").unwrap();
        assert!(read_form(&path).is_err());
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ldapmeta.toml");
        cmd_init(&path).unwrap();
        assert!(AppConfig::load_from_file(&path).is_ok());
        assert!(cmd_init(&path).is_err());
    }
}
