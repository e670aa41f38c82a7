//! Startup reconciliation example.
//!
//! Declares a small course catalog and reconciles it against a MySQL
//! database, the way an application would on boot.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use sqlx::mysql::MySqlPoolOptions;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_reconcile::prelude::*;

/// Reconciles a MySQL schema with the course catalog model.
#[derive(Parser)]
#[command(name = "startup-reconcile")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL.
    #[arg(short, long, env = "DATABASE_URL", default_value = "mysql://root@localhost/school")]
    database: String,

    /// JSON configuration file. Command-line flags override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create missing tables and migrate the flagged ones.
    Reconcile {
        /// Apply immediately or write migration files.
        #[arg(short, long, value_enum)]
        mode: Option<Mode>,

        /// Skip existing tables instead of relying on IF NOT EXISTS.
        #[arg(long)]
        check_tables_exist: bool,

        /// Directory for the migration and rollback files.
        #[arg(long)]
        artifact_dir: Option<PathBuf>,
    },

    /// Print the statements a reconciliation would run, without running them.
    Plan,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Auto,
    File,
}

impl From<Mode> for MigrationMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Auto => Self::Auto,
            Mode::File => Self::File,
        }
    }
}

struct Teacher;

impl Entity for Teacher {
    const TABLE: &'static str = "teachers";

    fn schema(table: TableSpec) -> TableSpec {
        table
            .priority(100)
            .migrate()
            .column(ColumnSpec::auto_increment_id("id"))
            .column(ColumnSpec::new("name", SqlType::Varchar(128)).not_null())
    }
}

struct Student;

impl Entity for Student {
    const TABLE: &'static str = "students";

    fn schema(table: TableSpec) -> TableSpec {
        table
            .migrate()
            .comment("Enrolled students")
            .collation("utf8mb4_unicode_ci")
            .column(ColumnSpec::auto_increment_id("id"))
            .column(ColumnSpec::new("full_name", SqlType::Varchar(128)).not_null())
            .column(ColumnSpec::new("email", SqlType::Varchar(255)).not_null().unique())
            .column(
                ColumnSpec::new("created_at", SqlType::Timestamp)
                    .not_null()
                    .default(DefaultValue::current_timestamp()),
            )
    }

    fn relations() -> Vec<RelationSpec> {
        vec![RelationSpec::many_to_many::<Course>("courses", "students")
            .join_table(JoinTableSpec::new().on_delete(ForeignKeyAction::Cascade))]
    }

    fn renames() -> Vec<RenameSpec> {
        vec![RenameSpec::new("full_name", "name")]
    }
}

struct Course;

impl Entity for Course {
    const TABLE: &'static str = "courses";

    fn schema(table: TableSpec) -> TableSpec {
        table
            .migrate()
            .column(ColumnSpec::auto_increment_id("id"))
            .column(ColumnSpec::new("title", SqlType::Varchar(200)).not_null().index())
            .column(
                ColumnSpec::new("published", SqlType::Boolean)
                    .not_null()
                    .default(DefaultValue::Bool(false)),
            )
            .column(
                ColumnSpec::new("teacher_id", SqlType::Integer)
                    .references("teachers", "id")
                    .on_delete_foreign(ForeignKeyAction::SetNull),
            )
    }

    fn relations() -> Vec<RelationSpec> {
        vec![
            RelationSpec::many_to_many::<Student>("students", "courses"),
            RelationSpec::many_to_one::<Teacher>("teacher").eager(),
        ]
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &cli.config {
        Some(path) => ReconcileConfig::from_json_file(path)?,
        None => ReconcileConfig::default(),
    };

    let registry = SchemaRegistry::builder()
        .register(Teacher)
        .register(Student)
        .register(Course)
        .build()?;

    info!("Connecting to database");
    let pool = MySqlPoolOptions::new()
        .max_connections(5)
        .connect(&cli.database)
        .await?;
    let db = MySqlDatabase::new(pool);

    match cli.command {
        Commands::Reconcile {
            mode,
            check_tables_exist,
            artifact_dir,
        } => {
            if let Some(mode) = mode {
                config = config.mode(mode.into());
            }
            if check_tables_exist {
                config = config.check_tables_exist(true);
            }
            if let Some(dir) = artifact_dir {
                config = config.artifact_dir(dir);
            }

            let summary = Reconciler::new(&registry, &db, config)
                .reconcile_schema()
                .await?;

            info!(
                created = summary.created_tables.len(),
                operations = summary.operations.len(),
                replayed = summary.replayed,
                "Reconciliation finished"
            );
            if let Some(path) = &summary.artifact {
                info!(path = %path.display(), "Restart to apply the written migrations");
            }
            if let Some(report) = &summary.applied {
                for failure in &report.failures {
                    warn!(error = %failure, "Migration statement failed");
                }
            }
        }
        Commands::Plan => {
            let operations = Reconciler::new(&registry, &db, config).plan().await?;
            if operations.is_empty() {
                info!("Schema is up to date");
            }
            for op in &operations {
                println!("{};", op.forward);
                if let Some(inverse) = &op.inverse {
                    println!("-- rollback: {};", inverse);
                }
            }
        }
    }

    Ok(())
}
