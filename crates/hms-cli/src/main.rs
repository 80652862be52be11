//! hms: hospital records with sealed fields, masked views, and an audit trail
//!
//! Commands:
//!   init [--reset] [--no-seed]   - create the schema and seed demo data
//!   config show                  - display current configuration
//!   patients list [--raw]        - masked registry (raw: admin only)
//!   patients show <id> [--raw]   - one record
//!   patients add                 - intake a new record (admin, receptionist)
//!   patients update <id>         - replace contact and/or diagnosis
//!   patients delete <id> --yes   - permanent delete, audited
//!   patients refresh             - recompute every mask (admin)
//!   audit list [--limit N]       - most recent audit entries (admin)
//!   audit trend [--days N]       - audit entries per day (admin)
//!   retention [--days N]         - records past the retention window
//!
//! Every command except `init` and `config` runs as one authenticated
//! session: login, the action, logout, each written to the audit trail.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use hms_core::config::{AuditConfig, HmsConfig, RetentionConfig};
use hms_core::types::{actions, Actor, PatientRecord, User};
use hms_crypto::{obtain_key, FieldCipher};
use hms_store::{RetentionPolicy, Store, TIMESTAMP_FORMAT};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "hms",
    version,
    about = "Hospital records with field encryption, masking and audit",
    long_about = "hms: role-gated access to encrypted patient records \
                  with an append-only audit trail"
)]
struct Cli {
    /// Path to hms.toml configuration file
    #[arg(long, short = 'c', env = "HMS_CONFIG", default_value = "hms.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "HMS_LOG", default_value = "info", global = true)]
    log: String,

    /// Log format (json, text)
    #[arg(long, env = "HMS_LOG_FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Account to authenticate as (prompted when absent)
    #[arg(long, short = 'u', env = "HMS_USERNAME", global = true)]
    username: Option<String>,

    /// Password (prompted without echo when absent)
    #[arg(long, env = "HMS_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the database schema, seeding demo users and patients
    Init {
        /// Delete the existing database file first
        #[arg(long)]
        reset: bool,
        /// Create the schema only
        #[arg(long)]
        no_seed: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Patient registry
    Patients {
        #[command(subcommand)]
        action: PatientsAction,
    },

    /// Audit trail review (admin)
    Audit {
        #[command(subcommand)]
        action: AuditAction,
    },

    /// List records older than the retention window. Nothing is deleted.
    Retention {
        /// Window in days (overrides config retention.days)
        #[arg(long)]
        days: Option<u32>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Subcommand, Debug)]
enum PatientsAction {
    /// All records, newest first
    List {
        /// Include decrypted name, contact and diagnosis
        #[arg(long)]
        raw: bool,
    },

    /// One record by id
    Show {
        id: i64,
        #[arg(long)]
        raw: bool,
    },

    /// Intake a new record
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        contact: String,
        #[arg(long)]
        diagnosis: String,
    },

    /// Replace contact and/or diagnosis; masks are recomputed
    Update {
        id: i64,
        #[arg(long)]
        contact: Option<String>,
        #[arg(long)]
        diagnosis: Option<String>,
    },

    /// Permanently delete a record
    Delete {
        id: i64,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Recompute every mask from the stored values
    Refresh,
}

impl PatientsAction {
    /// Argument checks that need no database.
    fn validate(&self) -> Result<()> {
        match self {
            PatientsAction::Update {
                contact: None,
                diagnosis: None,
                ..
            } => anyhow::bail!("provide --contact and/or --diagnosis to update"),
            PatientsAction::Delete { yes: false, id } => {
                anyhow::bail!("deleting patient {id} is permanent; pass --yes to confirm")
            }
            _ => Ok(()),
        }
    }
}

#[derive(Subcommand, Debug)]
enum AuditAction {
    /// Most recent entries first
    List {
        /// Maximum entries (overrides config audit.default_limit)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Entry counts per day
    Trend {
        /// Trailing window (overrides config audit.trend_window_days)
        #[arg(long)]
        days: Option<u32>,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log, &cli.log_format);

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "hms starting"
    );

    let config = HmsConfig::load(&cli.config)?;
    let creds = Credentials {
        username: cli.username,
        password: cli.password.map(SecretString::from),
    };

    match cli.command {
        Commands::Init { reset, no_seed } => cmd_init(&config, reset, !no_seed),
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
        Commands::Patients { action } => {
            action.validate()?;
            with_session(&config, creds, |store, user| {
                cmd_patients(store, user, action)
            })
        }
        Commands::Audit { action } => with_session(&config, creds, |store, user| {
            cmd_audit(store, user, action, &config.audit)
        }),
        Commands::Retention { days } => with_session(&config, creds, |store, user| {
            cmd_retention(store, user, days, &config.retention)
        }),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Sessions ──────────────────────────────────────────────────────────────────

struct Credentials {
    username: Option<String>,
    password: Option<SecretString>,
}

impl Credentials {
    fn resolve(self) -> Result<(String, SecretString)> {
        let username = match self.username {
            Some(username) => username,
            None => prompt_line("Username: ")?,
        };
        let password = match self.password {
            Some(password) => password,
            None => SecretString::from(
                rpassword::prompt_password("Password: ").context("reading password")?,
            ),
        };
        Ok((username, password))
    }
}

fn prompt_line(prompt: &str) -> Result<String> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading username")?;
    Ok(line.trim().to_string())
}

fn open_store(config: &HmsConfig) -> Result<Store> {
    let key = obtain_key(&config.keys.env_file, &config.keys.key_name)
        .context("obtaining field encryption key")?;
    Store::from_config(config, FieldCipher::new(&key))
        .with_context(|| format!("opening database {}", config.database.path.display()))
}

/// Log in, run `f`, log out. The logout entry is written even when `f` fails.
fn with_session<T>(
    config: &HmsConfig,
    creds: Credentials,
    f: impl FnOnce(&mut Store, &User) -> Result<T>,
) -> Result<T> {
    let mut store = open_store(config)?;
    let (username, password) = creds.resolve()?;
    let user = store
        .login(&username, password.expose_secret())?
        .with_context(|| format!("authentication failed for '{}'", username.trim()))?;

    let outcome = f(&mut store, &user);
    store.logout(&user)?;
    outcome
}

fn require(user: &User, allowed: bool, what: &str) -> Result<()> {
    if !allowed {
        tracing::warn!(user_id = user.user_id, role = %user.role, what, "permission denied");
        anyhow::bail!("role '{}' may not {what}", user.role);
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("serializing output")?;
    println!("{rendered}");
    Ok(())
}

// ── `hms init` ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct InitSummary {
    database: String,
    seeded: bool,
    patients: u64,
}

fn cmd_init(config: &HmsConfig, reset: bool, seed: bool) -> Result<()> {
    let db_path = &config.database.path;
    if reset && db_path.exists() {
        std::fs::remove_file(db_path)
            .with_context(|| format!("removing {}", db_path.display()))?;
        tracing::warn!(path = %db_path.display(), "database reset");
    }

    let mut store = open_store(config)?;
    store.init_db(seed, config.auth.password_scheme)?;

    print_json(&InitSummary {
        database: db_path.display().to_string(),
        seeded: seed,
        patients: store.patient_count()?,
    })
}

// ── `hms config show` ─────────────────────────────────────────────────────────

fn cmd_config_show(config: &HmsConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

// ── `hms patients` ────────────────────────────────────────────────────────────

fn view_mode(raw: bool) -> &'static str {
    if raw {
        "raw"
    } else {
        "anonymized"
    }
}

fn cmd_patients(store: &mut Store, user: &User, action: PatientsAction) -> Result<()> {
    let actor = Actor::from(user);

    match action {
        PatientsAction::List { raw } => {
            if raw {
                require(user, user.role.can_view_sensitive(), "view raw patient data")?;
            }
            let records = store.fetch_patients(raw)?;
            store.record_action(
                actor.user_id,
                &actor.role,
                actions::VIEW_PATIENTS,
                &format!("view={}, count={}", view_mode(raw), records.len()),
            )?;
            print_json(&records)
        }
        PatientsAction::Show { id, raw } => {
            if raw {
                require(user, user.role.can_view_sensitive(), "view raw patient data")?;
            }
            let record = store.get_patient(id, raw)?;
            store.record_action(
                actor.user_id,
                &actor.role,
                actions::VIEW_PATIENTS,
                &format!("patient_id={id}, view={}", view_mode(raw)),
            )?;
            print_json(&record)
        }
        PatientsAction::Add {
            name,
            contact,
            diagnosis,
        } => {
            require(user, user.role.can_edit_patients(), "add patients")?;
            let patient_id =
                store.create_patient_as(&actor, name.trim(), contact.trim(), diagnosis.trim())?;
            tracing::info!(patient_id, "patient record created");
            print_json(&store.get_patient(patient_id, false)?)
        }
        PatientsAction::Update {
            id,
            contact,
            diagnosis,
        } => {
            require(user, user.role.can_edit_patients(), "update patients")?;
            store.update_patient_as(
                &actor,
                id,
                contact.as_deref().map(str::trim),
                diagnosis.as_deref().map(str::trim),
            )?;
            tracing::info!(patient_id = id, "patient record updated and re-masked");
            print_json(&store.get_patient(id, false)?)
        }
        PatientsAction::Delete { id, .. } => {
            require(user, user.role.can_edit_patients(), "delete patients")?;
            store.delete_patient_as(&actor, id)?;
            tracing::info!(patient_id = id, "patient record deleted");
            print_json(&serde_json::json!({ "deleted": id }))
        }
        PatientsAction::Refresh => {
            require(user, user.role.can_view_audit(), "refresh anonymized fields")?;
            let refreshed = store.refresh_anonymized_fields_as(&actor)?;
            print_json(&serde_json::json!({ "refreshed": refreshed }))
        }
    }
}

// ── `hms audit` ───────────────────────────────────────────────────────────────

fn cmd_audit(
    store: &mut Store,
    user: &User,
    action: AuditAction,
    config: &AuditConfig,
) -> Result<()> {
    require(user, user.role.can_view_audit(), "view the audit trail")?;

    match action {
        AuditAction::List { limit } => {
            let entries = store.list_actions(limit.unwrap_or(config.default_limit))?;
            store.record_action(
                Some(user.user_id),
                user.role.as_str(),
                actions::VIEW_LOGS,
                "Admin reviewed audit trail",
            )?;
            print_json(&entries)
        }
        AuditAction::Trend { days } => {
            let days = days.unwrap_or(config.trend_window_days);
            let counts = store.counts_by_day(days)?;
            store.record_action(
                Some(user.user_id),
                user.role.as_str(),
                actions::VIEW_LOGS,
                &format!("Admin reviewed {days}-day activity trend"),
            )?;
            print_json(&counts)
        }
    }
}

// ── `hms retention` ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct RetentionReport<'a> {
    days: u32,
    cutoff: String,
    stale: Vec<&'a PatientRecord>,
}

fn cmd_retention(
    store: &mut Store,
    user: &User,
    days: Option<u32>,
    config: &RetentionConfig,
) -> Result<()> {
    require(user, user.role.can_edit_patients(), "review retention")?;

    let policy = days
        .map(RetentionPolicy::new)
        .unwrap_or_else(|| RetentionPolicy::from(config));
    let now = Utc::now();
    let records = store.fetch_patients(false)?;
    let stale = policy.stale_records(&records, now);

    store.record_action(
        Some(user.user_id),
        user.role.as_str(),
        actions::VIEW_PATIENTS,
        &format!("retention review, days={}, stale={}", policy.days, stale.len()),
    )?;
    if !stale.is_empty() {
        tracing::warn!(stale = stale.len(), days = policy.days, "records past retention window");
    }

    print_json(&RetentionReport {
        days: policy.days,
        cutoff: policy.cutoff(now).format(TIMESTAMP_FORMAT).to_string(),
        stale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use hms_core::types::Role;

    fn temp_config(dir: &tempfile::TempDir) -> HmsConfig {
        let mut config = HmsConfig::default();
        config.database.path = dir.path().join("data/hospital.db");
        config.keys.env_file = dir.path().join(".env");
        config.keys.key_name = "HMS_CLI_TEST_FIELD_KEY".into();
        config
    }

    fn creds(username: &str, password: &str) -> Credentials {
        Credentials {
            username: Some(username.into()),
            password: Some(SecretString::from(password.to_string())),
        }
    }

    fn trail(config: &HmsConfig) -> Vec<String> {
        open_store(config)
            .unwrap()
            .list_actions(50)
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_patients_update() {
        let cli = Cli::try_parse_from([
            "hms",
            "patients",
            "update",
            "3",
            "--contact",
            "+1-000-0000099",
            "--username",
            "admin",
        ])
        .unwrap();

        assert_eq!(cli.username.as_deref(), Some("admin"));
        match cli.command {
            Commands::Patients {
                action: PatientsAction::Update { id, contact, diagnosis },
            } => {
                assert_eq!(id, 3);
                assert_eq!(contact.as_deref(), Some("+1-000-0000099"));
                assert!(diagnosis.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_update_requires_a_field() {
        let action = PatientsAction::Update {
            id: 1,
            contact: None,
            diagnosis: None,
        };
        assert!(action.validate().is_err());
    }

    #[test]
    fn test_delete_requires_confirmation() {
        assert!(PatientsAction::Delete { id: 1, yes: false }.validate().is_err());
        assert!(PatientsAction::Delete { id: 1, yes: true }.validate().is_ok());
    }

    #[test]
    fn test_require_reports_role() {
        let user = User {
            user_id: 2,
            username: "Dr. Bob".into(),
            password_hash: String::new(),
            role: Role::Doctor,
        };
        let err = require(&user, user.role.can_view_audit(), "view the audit trail").unwrap_err();
        assert_eq!(err.to_string(), "role 'doctor' may not view the audit trail");
    }

    #[test]
    fn test_session_writes_login_action_logout() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(&dir);
        cmd_init(&config, false, true).unwrap();

        with_session(&config, creds("admin", "admin123"), |store, user| {
            cmd_patients(store, user, PatientsAction::List { raw: true })
        })
        .unwrap();

        assert_eq!(
            trail(&config),
            vec![actions::LOGOUT, actions::VIEW_PATIENTS, actions::LOGIN]
        );
    }

    #[test]
    fn test_denied_command_still_logs_out() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(&dir);
        cmd_init(&config, false, true).unwrap();

        let result = with_session(&config, creds("Dr. Bob", "doc123"), |store, user| {
            cmd_audit(store, user, AuditAction::List { limit: None }, &config.audit)
        });
        assert!(result.is_err());
        assert_eq!(trail(&config), vec![actions::LOGOUT, actions::LOGIN]);
    }

    #[test]
    fn test_bad_password_is_rejected_and_audited() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(&dir);
        cmd_init(&config, false, true).unwrap();

        let result = with_session(&config, creds("admin", "wrong"), |_, _| Ok(()));
        assert!(result.is_err());
        assert_eq!(trail(&config), vec![actions::LOGIN_FAILED]);
    }

    #[test]
    fn test_init_reset_recreates_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(&dir);
        cmd_init(&config, false, true).unwrap();

        with_session(&config, creds("Alice_recep", "rec123"), |store, user| {
            cmd_patients(
                store,
                user,
                PatientsAction::Add {
                    name: " New Patient ".into(),
                    contact: "555-0100".into(),
                    diagnosis: "Flu".into(),
                },
            )
        })
        .unwrap();
        assert_eq!(open_store(&config).unwrap().patient_count().unwrap(), 6);

        cmd_init(&config, true, false).unwrap();
        assert_eq!(open_store(&config).unwrap().patient_count().unwrap(), 0);
        assert!(trail(&config).is_empty());
    }
}
