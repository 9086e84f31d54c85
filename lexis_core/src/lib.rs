#![forbid(unsafe_code)]

//! Core domain model and scheduling engine for the Lexis vocabulary trainer.
//!
//! This crate provides:
//! - Domain types (lexical items, progress records, scores, review events)
//! - Lexicon catalog loading
//! - Progress store persistence
//! - Interval updates (active and passive) and the due-item query
//! - The daily new-item lottery
//! - Quiz generation contract and a study session driver
//! - Review log and CSV export

pub mod types;
pub mod error;
pub mod catalog;
pub mod config;
pub mod logging;
pub mod store;
pub mod scheduler;
pub mod lottery;
pub mod generation;
pub mod session;
pub mod review_log;
pub mod csv_export;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use catalog::build_flashcard;
pub use config::{Config, ScheduleConfig};
pub use scheduler::{due_items, passive_review_sentence, update_active, update_passive};
pub use lottery::{seed_new_items, select_new_items};
pub use generation::{
    parse_mcq, CatalogQuizBuilder, CommandGenerator, ContentGenerator, Mcq, QuizRequest,
};
pub use session::{AnswerOutcome, ScoreOutcome, StudySession};
pub use review_log::{JsonlReviewLog, ReviewSink};
