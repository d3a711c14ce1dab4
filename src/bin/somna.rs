//! Somna CLI - Command-line interface for the Somna sleep engine
//!
//! Commands:
//! - track: Track a session until Enter is pressed
//! - record: Record a session of a given length
//! - analyze / recommend: Phase analysis and personalized advice
//! - weekly / today / recent / stats: Derived views
//! - prune / clear: History maintenance
//! - habits: Digital-habits assessment
//! - doctor: Diagnose data file and environment

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use somna::habits::{self, DigitalHabits, HabitAssessment};
use somna::history::StoredSession;
use somna::types::format_duration;
use somna::{
    AnalysisOutcome, EngineConfig, EngineError, JsonFileStore, SleepEngine, StopOutcome,
    SOMNA_VERSION,
};

/// Somna - Sleep session tracking engine
#[derive(Parser)]
#[command(name = "somna")]
#[command(author = "Somna Contributors")]
#[command(version = SOMNA_VERSION)]
#[command(about = "Track sleep sessions, analyze phases and get recommendations", long_about = None)]
struct Cli {
    /// History file (overrides the config file)
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    /// Engine configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging (SOMNA_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track a sleep session until Enter is pressed
    Track,

    /// Record a session of the given length, ending now
    Record {
        /// Elapsed hours
        #[arg(long, default_value = "0", value_parser = clap::value_parser!(u32).range(0..=48))]
        hours: u32,

        /// Elapsed minutes
        #[arg(long, default_value = "0", value_parser = clap::value_parser!(u32).range(0..60))]
        minutes: u32,
    },

    /// Analyze the latest session's sleep phases
    Analyze,

    /// Personalized recommendations, daily tip and quick tips
    Recommend,

    /// Rolling seven-day view, today first
    Weekly,

    /// Today's totals
    Today,

    /// Most recent sessions
    Recent,

    /// Whole-history statistics
    Stats,

    /// Remove sessions older than the retention horizon
    Prune,

    /// Delete all sessions
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },

    /// Assess a sleep interval with digital-habits figures
    Habits {
        /// Sleep start (ISO-8601 / RFC 3339)
        #[arg(long)]
        start: String,

        /// Sleep end (ISO-8601 / RFC 3339)
        #[arg(long)]
        end: String,

        /// Screen time in minutes
        #[arg(long, default_value = "0")]
        screen: u32,

        /// Social media time in minutes
        #[arg(long, default_value = "0")]
        social: u32,

        /// Gaming time in minutes
        #[arg(long, default_value = "0")]
        gaming: u32,
    },

    /// Diagnose data file and environment
    Doctor,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string()));
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("SOMNA_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), SomnaCliError> {
    let config = load_config(cli.config.as_deref(), cli.data)?;
    let json = cli.json;

    match cli.command {
        Commands::Track => cmd_track(&config, json),
        Commands::Record { hours, minutes } => cmd_record(&config, hours, minutes, json),
        Commands::Analyze => cmd_analyze(&config, json),
        Commands::Recommend => cmd_recommend(&config, json),
        Commands::Weekly => cmd_weekly(&config, json),
        Commands::Today => cmd_today(&config, json),
        Commands::Recent => cmd_recent(&config, json),
        Commands::Stats => cmd_stats(&config, json),
        Commands::Prune => cmd_prune(&config, json),
        Commands::Clear { yes } => cmd_clear(&config, yes, json),
        Commands::Habits {
            start,
            end,
            screen,
            social,
            gaming,
        } => {
            let habits = DigitalHabits {
                screen_time_minutes: screen,
                social_media_minutes: social,
                gaming_minutes: gaming,
            };
            cmd_habits(&start, &end, habits, json)
        }
        Commands::Doctor => cmd_doctor(&config, cli.config.as_deref(), json),
    }
}

fn load_config(path: Option<&Path>, data: Option<PathBuf>) -> Result<EngineConfig, SomnaCliError> {
    let config = match path {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    let config = match data {
        Some(data) => config.with_data_path(data),
        None => config,
    };
    config.validate()?;
    Ok(config)
}

fn open_engine(config: &EngineConfig) -> Result<SleepEngine, SomnaCliError> {
    let store = JsonFileStore::new(&config.data_path);
    Ok(SleepEngine::open(config.clone(), Box::new(store))?)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), SomnaCliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn warn_not_persisted(persisted: bool) {
    if !persisted {
        eprintln!("warning: history could not be saved; changes are kept only for this run");
    }
}

fn cmd_track(config: &EngineConfig, json: bool) -> Result<(), SomnaCliError> {
    let mut engine = open_engine(config)?;
    engine.start();
    let started = Instant::now();

    if atty::is(atty::Stream::Stdin) {
        eprint!("Tracking sleep. Press Enter to stop... ");
        io::stderr().flush()?;
    }

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    engine.advance(started.elapsed().as_secs());

    let outcome = engine.stop().ok_or(SomnaCliError::NotTracking)?;
    print_stop(&outcome, json)
}

fn cmd_record(config: &EngineConfig, hours: u32, minutes: u32, json: bool) -> Result<(), SomnaCliError> {
    let mut engine = open_engine(config)?;
    let now = chrono::Local::now().naive_local();
    let outcome = engine
        .record_elapsed_at(hours, minutes, now)?
        .ok_or(SomnaCliError::NotTracking)?;
    print_stop(&outcome, json)
}

fn print_stop(outcome: &StopOutcome, json: bool) -> Result<(), SomnaCliError> {
    if json {
        return print_json(outcome);
    }
    let session = &outcome.session;
    println!(
        "Session saved: {} (quality {}/10)",
        format_duration(session.total_minutes()),
        session.quality_10
    );
    println!("  {} -> {} on {}", session.start_time, session.end_time, session.date);
    if session.has_phases() {
        println!("  {} phases synthesized", session.phases.len());
    }
    warn_not_persisted(outcome.persisted);
    Ok(())
}

fn cmd_analyze(config: &EngineConfig, json: bool) -> Result<(), SomnaCliError> {
    let mut engine = open_engine(config)?;
    let outcome = engine.request_analysis();

    if json {
        return print_json(&outcome);
    }

    match outcome {
        AnalysisOutcome::NoRecords => println!("No sleep records yet."),
        AnalysisOutcome::InsufficientData { hours, minutes } => {
            println!("Insufficient data for phase analysis ({hours}h {minutes}m recorded).");
        }
        AnalysisOutcome::Analyzed {
            session,
            report,
            persisted,
            ..
        } => {
            println!("Sleep Analysis for {}", session.date);
            println!("========================");
            println!("Score:    {}/100 ({})", report.total_score, report.band.as_str());
            println!("Duration: {}", format_duration(report.total_duration));
            println!("Cycles:   {}", report.cycle_count);
            println!("\nPhases:");
            for (kind, minutes) in &report.phase_totals {
                println!("  {:<13} {}", kind.label(), format_duration(*minutes));
            }
            println!("\nFindings:");
            for message in &report.messages {
                println!("  - {message}");
            }
            warn_not_persisted(persisted);
        }
    }
    Ok(())
}

fn cmd_recommend(config: &EngineConfig, json: bool) -> Result<(), SomnaCliError> {
    let mut engine = open_engine(config)?;
    let advice = engine.request_recommendations();

    if json {
        return print_json(&advice);
    }

    println!("Recommendations:");
    for (i, rec) in advice.recommendations.iter().enumerate() {
        println!("  {}. {rec}", i + 1);
    }
    println!("\nTip of the day: {}", advice.daily_tip);
    println!("\nQuick tips:");
    for tip in &advice.quick_tips {
        println!("  - {tip}");
    }
    Ok(())
}

fn cmd_weekly(config: &EngineConfig, json: bool) -> Result<(), SomnaCliError> {
    let engine = open_engine(config)?;
    let buckets = engine.weekly();

    if json {
        return print_json(&buckets);
    }

    for bucket in &buckets {
        println!(
            "{} {}  {:>7}  {:>2}/10  ({} records)",
            bucket.day_label,
            bucket.date,
            format_duration(bucket.total_minutes()),
            bucket.quality_10,
            bucket.record_count
        );
    }
    Ok(())
}

fn cmd_today(config: &EngineConfig, json: bool) -> Result<(), SomnaCliError> {
    let engine = open_engine(config)?;
    let today = engine.today();

    if json {
        return print_json(&today);
    }

    println!("Today ({})", today.date);
    println!("  Slept:   {}", format_duration(today.total_minutes));
    println!("  Quality: {}/10", today.average_quality);
    println!("  Records: {}", today.record_count);
    Ok(())
}

fn cmd_recent(config: &EngineConfig, json: bool) -> Result<(), SomnaCliError> {
    let engine = open_engine(config)?;
    let recent = engine.recent();

    if json {
        return print_json(&recent);
    }

    if recent.is_empty() {
        println!("No sleep records yet.");
    }
    for session in recent {
        println!("{}", session.summary_line());
    }
    Ok(())
}

fn cmd_stats(config: &EngineConfig, json: bool) -> Result<(), SomnaCliError> {
    let engine = open_engine(config)?;
    let stats = engine.stats();

    if json {
        return print_json(&stats);
    }

    println!("Records:         {}", stats.record_count);
    println!("Average sleep:   {}", format_duration(stats.average_minutes));
    println!("Average quality: {}/10", stats.average_quality);
    println!("Total sleep:     {}", format_duration(stats.total_minutes));
    Ok(())
}

fn cmd_prune(config: &EngineConfig, json: bool) -> Result<(), SomnaCliError> {
    let config = EngineConfig {
        prune_on_start: false,
        ..config.clone()
    };
    let mut engine = open_engine(&config)?;
    let outcome = engine.prune();

    if json {
        return print_json(&outcome);
    }

    println!("Removed {} session(s) older than {} days", outcome.removed, config.retention_days);
    if outcome.removed > 0 {
        warn_not_persisted(outcome.persisted);
    }
    Ok(())
}

fn cmd_clear(config: &EngineConfig, yes: bool, json: bool) -> Result<(), SomnaCliError> {
    if !yes {
        return Err(SomnaCliError::ConfirmationRequired);
    }
    let mut engine = open_engine(config)?;
    let removed = engine.history().len();
    let persisted = engine.clear_all();

    if json {
        return print_json(&serde_json::json!({ "removed": removed, "persisted": persisted }));
    }

    println!("Deleted {removed} session(s)");
    warn_not_persisted(persisted);
    Ok(())
}

fn cmd_habits(start: &str, end: &str, habits: DigitalHabits, json: bool) -> Result<(), SomnaCliError> {
    let assessment: HabitAssessment = habits::assess(start, end, habits)?;

    if json {
        return print_json(&assessment);
    }

    println!("Day:           {}", assessment.day_of_week);
    println!("Duration:      {:.2} h", assessment.duration_hours);
    println!("Quality score: {:.1}/100", assessment.quality_score);
    println!("Recommendations:");
    for rec in &assessment.recommendations {
        println!("  - {rec}");
    }
    Ok(())
}

fn cmd_doctor(config: &EngineConfig, config_path: Option<&Path>, json: bool) -> Result<(), SomnaCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "somna_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Somna version {}", SOMNA_VERSION),
    });

    if let Some(path) = config_path {
        checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: format!("Config file {} valid", path.display()),
        });
    }

    checks.push(check_data_file(&config.data_path));

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive tracking available)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Warning,
            message: "stdin is not a TTY (track stops at the first line or EOF)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        version: SOMNA_VERSION.to_string(),
        data_path: config.data_path.display().to_string(),
        checks,
    };

    if json {
        print_json(&report)?;
    } else {
        println!("Somna Doctor Report");
        println!("===================");
        println!("Version: {}", report.version);
        println!("Data:    {}", report.data_path);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(SomnaCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn check_data_file(path: &Path) -> DoctorCheck {
    let name = "data_file".to_string();
    if !path.exists() {
        return DoctorCheck {
            name,
            status: CheckStatus::Warning,
            message: "History file does not exist yet".to_string(),
        };
    }

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            return DoctorCheck {
                name,
                status: CheckStatus::Error,
                message: format!("Cannot read history file: {}", e),
            }
        }
    };

    match serde_json::from_str::<Vec<serde_json::Value>>(&content) {
        Ok(values) => {
            let total = values.len();
            let records: Vec<StoredSession> = values
                .into_iter()
                .filter_map(|v| serde_json::from_value(v).ok())
                .collect();
            let unreadable = total - records.len();
            let legacy = records.iter().filter(|r| r.is_legacy()).count();
            let status = if legacy > 0 || unreadable > 0 {
                CheckStatus::Warning
            } else {
                CheckStatus::Ok
            };
            DoctorCheck {
                name,
                status,
                message: format!(
                    "History file valid ({} records, {} with legacy 1-5 quality, {} unreadable and skipped)",
                    records.len(),
                    legacy,
                    unreadable
                ),
            }
        }
        Err(e) => DoctorCheck {
            name,
            status: CheckStatus::Error,
            message: format!("Invalid history JSON: {}", e),
        },
    }
}

// Error types

#[derive(Debug)]
enum SomnaCliError {
    Io(io::Error),
    Engine(EngineError),
    Json(serde_json::Error),
    NotTracking,
    ConfirmationRequired,
    DoctorFailed,
}

impl From<io::Error> for SomnaCliError {
    fn from(e: io::Error) -> Self {
        SomnaCliError::Io(e)
    }
}

impl From<EngineError> for SomnaCliError {
    fn from(e: EngineError) -> Self {
        SomnaCliError::Engine(e)
    }
}

impl From<serde_json::Error> for SomnaCliError {
    fn from(e: serde_json::Error) -> Self {
        SomnaCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<SomnaCliError> for CliError {
    fn from(e: SomnaCliError) -> Self {
        match e {
            SomnaCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            SomnaCliError::Engine(EngineError::ConfigError(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Check the --config file".to_string()),
            },
            SomnaCliError::Engine(EngineError::InvalidSession(msg)) => CliError {
                code: "INVALID_SESSION".to_string(),
                message: msg,
                hint: Some("Use ISO-8601 timestamps with start before end".to_string()),
            },
            SomnaCliError::Engine(e) => CliError {
                code: "ENGINE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'somna doctor' for details".to_string()),
            },
            SomnaCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            SomnaCliError::NotTracking => CliError {
                code: "NOT_TRACKING".to_string(),
                message: "No session is being tracked".to_string(),
                hint: None,
            },
            SomnaCliError::ConfirmationRequired => CliError {
                code: "CONFIRMATION_REQUIRED".to_string(),
                message: "Refusing to delete all sessions".to_string(),
                hint: Some("Re-run with --yes".to_string()),
            },
            SomnaCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct DoctorReport {
    version: String,
    data_path: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
