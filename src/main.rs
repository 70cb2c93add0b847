use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use cohort_admissions::{
    create_memberships, get_events_for_entity, init_tracing, insert_academy, insert_cohort,
    insert_user, load_csv, load_dotenv, open_database, run_script, Academy, Cohort, Config,
    CreateItem, EducationalStatus, FinancialStatus, MembershipFilter, Role, User,
};
use cohort_admissions::monitoring::ACTIVE_ON_ENDED;

const CLI_ACTOR: &str = "cli";

/// Manage cohort memberships from the command line
#[derive(Parser)]
#[command(name = "cohort-admissions")]
#[command(about = "cohort-admissions - cohort membership store", long_about = None)]
#[command(version)]
struct Cli {
    /// Database file (overrides ADMISSIONS_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Show targets and line numbers in log output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,

    /// Load academies.csv, cohorts.csv, users.csv and (optionally) memberships.csv
    Seed {
        /// Directory holding the CSV files
        dir: PathBuf,
    },

    /// List memberships matching the given filters
    List {
        /// Comma-separated roles (STUDENT, ASSISTANT, TEACHER)
        #[arg(long)]
        roles: Option<String>,

        /// Comma-separated financial statuses
        #[arg(long = "finantial-status")]
        finantial_status: Option<String>,

        /// Comma-separated educational statuses
        #[arg(long)]
        educational_status: Option<String>,

        /// Comma-separated academy slugs
        #[arg(long)]
        academy: Option<String>,

        /// Comma-separated cohort slugs
        #[arg(long)]
        cohorts: Option<String>,
    },

    /// Report ACTIVE students on ENDED cohorts of an academy
    Check {
        academy_id: i64,
    },

    /// Show the audit trail of one membership
    Events {
        membership_id: i64,
    },
}

/// One row of memberships.csv
#[derive(Debug, Deserialize)]
struct MembershipRow {
    user: i64,
    cohort: i64,
    role: Option<Role>,
    finantial_status: Option<FinancialStatus>,
    educational_status: Option<EducationalStatus>,
}

impl From<MembershipRow> for CreateItem {
    fn from(row: MembershipRow) -> Self {
        CreateItem {
            user: row.user,
            cohort: row.cohort,
            role: row.role.unwrap_or_default(),
            financial_status: row.finantial_status,
            educational_status: row.educational_status,
        }
    }
}

fn main() -> Result<()> {
    load_dotenv();
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    init_tracing(&config.log_level, cli.verbose);

    let mut conn = open_database(&config.db_path)?;

    match cli.command {
        Commands::Init => {
            println!("✓ Database ready at {}", config.db_path.display());
        }
        Commands::Seed { dir } => run_seed(&mut conn, &dir)?,
        Commands::List {
            roles,
            finantial_status,
            educational_status,
            academy,
            cohorts,
        } => {
            let mut filter = MembershipFilter::new();
            let params = [
                ("roles", roles),
                ("finantial_status", finantial_status),
                ("educational_status", educational_status),
                ("academy", academy),
                ("cohorts", cohorts),
            ];
            for (name, value) in params {
                if let Some(value) = value {
                    filter.set(name, &value);
                }
            }
            run_list(&conn, &filter, config.scan_chunk)?;
        }
        Commands::Check { academy_id } => {
            let report = run_script(&conn, ACTIVE_ON_ENDED, academy_id)?;
            println!("{:?}: {}", report.status, report.text);
        }
        Commands::Events { membership_id } => {
            let events = get_events_for_entity(&conn, "membership", &membership_id.to_string())?;
            if events.is_empty() {
                println!("No events for membership {}", membership_id);
            }
            for event in events {
                println!(
                    "{}  {:<20} {:<16} {}",
                    event.timestamp.to_rfc3339(),
                    event.event_type,
                    event.actor,
                    event.data
                );
            }
        }
    }

    Ok(())
}

fn run_seed(conn: &mut Connection, dir: &Path) -> Result<()> {
    println!("📂 Seeding from {}", dir.display());

    let academies: Vec<Academy> = load_csv(&dir.join("academies.csv"))?;
    for academy in &academies {
        insert_academy(conn, academy)
            .with_context(|| format!("Failed to insert academy {}", academy.slug))?;
    }
    println!("✓ {} academies", academies.len());

    let cohorts: Vec<Cohort> = load_csv(&dir.join("cohorts.csv"))?;
    for cohort in &cohorts {
        insert_cohort(conn, cohort)
            .with_context(|| format!("Failed to insert cohort {}", cohort.slug))?;
    }
    println!("✓ {} cohorts", cohorts.len());

    let users: Vec<User> = load_csv(&dir.join("users.csv"))?;
    for user in &users {
        insert_user(conn, user).with_context(|| format!("Failed to insert user {}", user.email))?;
    }
    println!("✓ {} users", users.len());

    let memberships_csv = dir.join("memberships.csv");
    if memberships_csv.exists() {
        let rows: Vec<MembershipRow> = load_csv(&memberships_csv)?;
        let items: Vec<CreateItem> = rows.into_iter().map(CreateItem::from).collect();
        let created = create_memberships(conn, &items, CLI_ACTOR)
            .context("Failed to create memberships")?;
        println!("✓ {} memberships", created.len());
    }

    info!(dir = %dir.display(), "seed complete");
    Ok(())
}

fn run_list(conn: &Connection, filter: &MembershipFilter, chunk: usize) -> Result<()> {
    println!(
        "{:>6} {:>6} {:>6}  {:<10} {:<12} {:<10}",
        "id", "user", "cohort", "role", "financial", "education"
    );

    let mut shown = 0usize;
    for membership in filter.scan(conn, chunk) {
        let m = membership?;
        println!(
            "{:>6} {:>6} {:>6}  {:<10} {:<12} {:<10}",
            m.id,
            m.user_id,
            m.cohort_id,
            m.role,
            m.financial_status.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
            m.educational_status.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
        );
        shown += 1;
    }

    println!("\n{} memberships", shown);
    Ok(())
}
