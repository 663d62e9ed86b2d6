use std::fmt;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use raccoon_core::model::{AnswerId, Catalog, CatalogDocument, ProgressState, QuestionId, UserId};
use raccoon_core::progression::TransitionKind;
use raccoon_core::settings::{DEFAULT_CONFLICT_RETRY_ATTEMPTS, ProgressionSettings};
use raccoon_core::time::DayBoundary;
use services::{AppServices, CatalogService, Clock, Learner};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    InvalidDbUrl { raw: String },
    NotSqlite,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::NotSqlite => write!(f, "catalog import needs a SQLite database"),
        }
    }
}

impl std::error::Error for ArgsError {}

#[derive(Parser)]
#[command(name = "raccoon")]
#[command(version, about = "Raccoon Bounty progression from the command line")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Config {
    /// SQLite database holding content and account progress
    #[arg(long = "db", global = true, env = "RACCOON_DB_URL", default_value = "sqlite://raccoon.sqlite3")]
    db_url: String,

    /// Local file holding guest progress
    #[arg(long, global = true, env = "RACCOON_GUEST_FILE", default_value = "raccoon-guest.json")]
    guest_file: PathBuf,

    /// XP needed per level; must be positive
    #[arg(long, global = true, env = "RACCOON_XP_PER_LEVEL", default_value = "100")]
    xp_per_level: i64,

    #[arg(long, global = true, env = "RACCOON_SECTION_XP", default_value = "40")]
    section_xp: i64,

    #[arg(long, global = true, env = "RACCOON_CAMPAIGN_XP", default_value = "150")]
    campaign_xp: i64,

    /// Count streak days in UTC instead of local time
    #[arg(long, global = true)]
    utc_days: bool,
}

#[derive(Args)]
struct LearnerArg {
    /// Signed-in user id; omit to act as the local guest
    #[arg(long, env = "RACCOON_USER")]
    user: Option<String>,
}

impl LearnerArg {
    fn resolve(&self) -> Result<Learner, raccoon_core::Error> {
        Ok(match &self.user {
            Some(raw) => Learner::Account(UserId::new(raw.as_str())?),
            None => Learner::Guest,
        })
    }
}

#[derive(Subcommand)]
enum Command {
    /// Replace stored content with a catalog JSON file
    Import { path: PathBuf },

    /// Show XP, level and streak
    Status {
        #[command(flatten)]
        learner: LearnerArg,
        #[arg(long)]
        json: bool,
    },

    /// Answer a question
    Answer {
        #[arg(long)]
        question: u64,
        #[arg(long)]
        answer: u64,
        #[command(flatten)]
        learner: LearnerArg,
    },

    /// Sign in: fold guest progress into the account
    Login {
        #[arg(long, env = "RACCOON_USER")]
        user: String,
    },

    /// List campaigns and sections with their lock state
    Catalog {
        #[command(flatten)]
        learner: LearnerArg,
        #[arg(long)]
        json: bool,
    },
}

impl Config {
    fn settings(&self) -> Result<ProgressionSettings, raccoon_core::Error> {
        let boundary = if self.utc_days {
            DayBoundary::Utc
        } else {
            DayBoundary::Local
        };
        Ok(ProgressionSettings::new(
            self.xp_per_level,
            self.section_xp,
            self.campaign_xp,
            boundary,
            DEFAULT_CONFLICT_RETRY_ATTEMPTS,
        )?)
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn print_state(label: &str, state: &ProgressState, app: &AppServices) {
    let level = app.progress().level_progress(state);
    println!("{label}");
    println!(
        "  level {} ({}/{} xp, {:.0}% to next)",
        level.level, level.xp_into_level, level.xp_per_level, level.percent_to_next
    );
    println!("  total xp {}  streak {}", state.total_xp(), state.streak());
    println!(
        "  answered {}  sections {}  campaigns {}",
        state.answered_questions().len(),
        state.completed_sections().len(),
        state.completed_campaigns().len()
    );
}

fn learner_label(learner: &Learner) -> String {
    match learner {
        Learner::Guest => "guest".to_string(),
        Learner::Account(user) => user.to_string(),
    }
}

fn answer_message(kind: TransitionKind, xp: u64) -> String {
    match kind {
        TransitionKind::Awarded => format!("correct! +{xp} xp"),
        TransitionKind::Incorrect => "not quite, try again".to_string(),
        TransitionKind::AlreadyCredited => "already answered, no xp this time".to_string(),
        other => format!("answer not counted ({other:?})"),
    }
}

fn print_catalog(catalog: &Catalog, state: &ProgressState) {
    for campaign in CatalogService::campaign_views(catalog, state) {
        let mark = if campaign.completed {
            "done"
        } else if campaign.unlocked {
            "open"
        } else {
            "locked"
        };
        println!("[{mark}] {} {}", campaign.campaign.id, campaign.campaign.title);
        for section in campaign.sections {
            let mark = if section.completed {
                "done"
            } else if section.unlocked {
                "open"
            } else {
                "locked"
            };
            println!(
                "    [{mark}] {} {} ({}/{})",
                section.section.id, section.section.title, section.answered, section.total
            );
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = cli.config.settings()?;

    let db_url = normalize_sqlite_url(cli.config.db_url.clone());
    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&db_url)?;
    let app = AppServices::new_sqlite(
        &db_url,
        cli.config.guest_file.clone(),
        &settings,
        Clock::default_clock(),
    )
    .await?;
    tracing::debug!(db = %db_url, guest_file = %cli.config.guest_file.display(), "services ready");

    match cli.command {
        Command::Import { path } => {
            let text = tokio::fs::read_to_string(&path).await?;
            let document: CatalogDocument = serde_json::from_str(&text)?;
            let catalog = Catalog::new(document)?;
            app.sqlite()
                .ok_or(ArgsError::NotSqlite)?
                .import_catalog(&catalog)
                .await?;
            println!(
                "imported {} campaigns from {}",
                catalog.campaigns().len(),
                path.display()
            );
        }
        Command::Status { learner, json } => {
            let learner = learner.resolve()?;
            let state = app.progress().current_state(&learner).await?;
            if json {
                let level = app.progress().level_progress(&state);
                let body = serde_json::json!({ "state": state, "level": level });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                print_state(&learner_label(&learner), &state, &app);
            }
        }
        Command::Answer {
            question,
            answer,
            learner,
        } => {
            let learner = learner.resolve()?;
            let catalog = app.catalog().load_catalog().await?;
            let mut local = app.progress().current_state(&learner).await?;
            let outcome = app
                .progress()
                .answer(
                    &learner,
                    &catalog,
                    QuestionId::new(question),
                    AnswerId::new(answer),
                    &mut local,
                )
                .await?;

            println!("{}", answer_message(outcome.cascade.question, outcome.cascade.question_xp));
            if outcome.cascade.section_completed() {
                println!("section complete! +{} xp", outcome.cascade.section_xp);
            }
            if outcome.cascade.campaign_completed() {
                println!("campaign complete! +{} xp", outcome.cascade.campaign_xp);
            }
            print_state(&learner_label(&learner), &local, &app);
        }
        Command::Login { user } => {
            let user = UserId::new(user)?;
            let catalog = app.catalog().load_catalog().await?;
            let report = app.progress().merge_on_login(&user, &catalog).await?;
            if !report.merged {
                println!("no guest progress to merge");
            } else if report.replayed {
                println!("guest progress was already merged; nothing added");
            } else {
                println!("merged guest progress: +{} xp", report.xp_added);
            }
            if report.completion_xp > 0 {
                println!("completions unlocked by the merge: +{} xp", report.completion_xp);
            }
            print_state(user.as_str(), &report.state, &app);
        }
        Command::Catalog { learner, json } => {
            let learner = learner.resolve()?;
            let catalog = app.catalog().load_catalog().await?;
            let state = app.progress().current_state(&learner).await?;
            if json {
                let views = CatalogService::campaign_views(&catalog, &state);
                println!("{}", serde_json::to_string_pretty(&views)?);
            } else {
                print_catalog(&catalog, &state);
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
