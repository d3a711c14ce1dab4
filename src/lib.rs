//! Somna - Sleep session tracking engine
//!
//! Somna records sleep sessions from an external one-second clock, derives a
//! coarse 1-10 quality on stop, synthesizes sleep phase sequences, and scores
//! them. Derived views cover a rolling seven-day window, today's totals and
//! personalized recommendations.
//!
//! ## Modules
//!
//! - **Tracking**: [`recorder`] state machine driven by [`engine::SleepEngine`]
//! - **Analysis**: [`phases`] synthesis, [`scoring`], [`quality`]
//! - **Views**: [`weekly`], [`advisor`], [`history`] summaries
//! - **Storage**: [`store`] collaborators and [`retention`]
//! - **Digital habits**: the independent screen-time scoring path in [`habits`]

pub mod advisor;
pub mod config;
pub mod engine;
pub mod error;
pub mod habits;
pub mod history;
pub mod phases;
pub mod quality;
pub mod recorder;
pub mod retention;
pub mod scoring;
pub mod store;
pub mod types;
pub mod weekly;

pub use config::EngineConfig;
pub use engine::{AnalysisOutcome, PruneOutcome, SleepEngine, StopOutcome};
pub use error::EngineError;
pub use history::History;
pub use phases::{RangeDraw, RngDraw};
pub use store::{HistoryStore, JsonFileStore, MemoryStore};
pub use types::{
    Advice, HistoryStats, PhaseKind, PhaseReport, ScoreBand, SleepPhase, SleepSession,
    TodaySummary, WeeklyBucket,
};

/// Somna version reported by the CLI
pub const SOMNA_VERSION: &str = env!("CARGO_PKG_VERSION");
