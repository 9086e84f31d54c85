use chrono::NaiveDate;
use clap::{ArgAction, Parser, Subcommand};
use lexis_core::csv_export::{cleanup_processed_logs, log_to_csv_and_archive};
use lexis_core::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lexis")]
#[command(about = "Spaced-repetition vocabulary scheduler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Directory holding per-level vocabulary files
    #[arg(long, global = true)]
    catalog_dir: Option<PathBuf>,

    /// Vocabulary file to load instead of level files (repeatable)
    #[arg(long = "vocab", global = true)]
    vocab: Vec<PathBuf>,

    /// Config file (defaults to the XDG config path)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Study as if today were this date (YYYY-MM-DD)
    #[arg(long, global = true)]
    today: Option<NaiveDate>,

    /// Seed the lottery for a reproducible pick
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Study today's new and due items (default)
    Study {
        /// Answer every quiz correctly and rate recall with this score (for testing)
        #[arg(long)]
        score: Option<i64>,

        /// Show the plan without changing progress
        #[arg(long)]
        dry_run: bool,
    },

    /// List items due today
    Due,

    /// Draw today's new items and add them to the schedule
    New {
        /// Show the draw without saving it
        #[arg(long)]
        dry_run: bool,
    },

    /// Record a recall score for one item
    Review {
        word: String,

        #[arg(allow_negative_numbers = true)]
        score: i64,

        /// Sentence the item was shown in; known items in it get a passive review
        #[arg(long)]
        sentence: Option<String>,
    },

    /// Roll the review log up into reviews.csv
    Export {
        /// Remove archived review logs afterwards
        #[arg(long)]
        cleanup: bool,
    },
}

/// Paths and settings shared by all commands
struct Context {
    config: Config,
    data_dir: PathBuf,
    today: NaiveDate,
    rng: StdRng,
}

impl Context {
    fn progress_path(&self) -> PathBuf {
        Config::progress_path(&self.data_dir)
    }

    fn review_log(&self) -> JsonlReviewLog {
        JsonlReviewLog::new(Config::review_log_path(&self.data_dir))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    lexis_core::logging::init_with_verbosity(cli.verbose);

    let mut config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(ref dir) = cli.catalog_dir {
        config.catalog.dir = dir.clone();
    }
    if !cli.vocab.is_empty() {
        config.catalog.paths = cli.vocab.clone();
    }

    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| config.data.data_dir.clone());
    let today = cli
        .today
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut ctx = Context {
        config,
        data_dir,
        today,
        rng,
    };

    match cli.command {
        Some(Commands::Study { score, dry_run }) => cmd_study(&mut ctx, score, dry_run),
        Some(Commands::Due) => cmd_due(&ctx),
        Some(Commands::New { dry_run }) => cmd_new(&mut ctx, dry_run),
        Some(Commands::Review {
            word,
            score,
            sentence,
        }) => cmd_review(&ctx, &word, score, sentence.as_deref()),
        Some(Commands::Export { cleanup }) => cmd_export(&ctx, cleanup),
        None => cmd_study(&mut ctx, None, false),
    }
}

fn load_lexicon(config: &Config) -> Result<Lexicon> {
    let catalog = &config.catalog;
    let lexicon = if catalog.paths.is_empty() {
        Lexicon::load_levels(
            &catalog.dir,
            &catalog.file_pattern,
            catalog.first_level,
            catalog.max_level,
        )?
    } else {
        Lexicon::load_paths(&catalog.paths)?
    };

    let errors = lexicon.validate();
    if !errors.is_empty() {
        eprintln!("Catalog validation errors:");
        for error in errors {
            eprintln!("  - {}", error);
        }
        return Err(Error::CatalogValidation("Invalid catalog".into()));
    }

    Ok(lexicon)
}

fn cmd_study(ctx: &mut Context, auto_score: Option<i64>, dry_run: bool) -> Result<()> {
    if let Some(score) = auto_score {
        RecallScore::new(score)?;
    }

    let lexicon = load_lexicon(&ctx.config)?;
    let progress_path = ctx.progress_path();
    let mut store = ProgressStore::load(&progress_path)?;

    if dry_run {
        let mut preview = store.clone();
        let session = StudySession::plan(
            &lexicon,
            &mut preview,
            &ctx.config.schedule,
            ctx.today,
            &mut ctx.rng,
        );
        display_plan(&session, &lexicon, &preview);
        println!("\n[Dry run - progress not saved]");
        return Ok(());
    }

    let mut session = StudySession::plan(
        &lexicon,
        &mut store,
        &ctx.config.schedule,
        ctx.today,
        &mut ctx.rng,
    );
    store.save(&progress_path)?;

    if session.is_finished() {
        println!("🎉 Nothing to review today!");
        return Ok(());
    }
    display_plan(&session, &lexicon, &store);

    let command = &ctx.config.generator.command;
    let mut generator: Box<dyn ContentGenerator + '_> = if command.is_empty() {
        Box::new(CatalogQuizBuilder::new(
            &lexicon,
            StdRng::seed_from_u64(ctx.rng.gen()),
        ))
    } else {
        Box::new(CommandGenerator::new(command)?)
    };
    let mut log = ctx.review_log();
    let stdin = io::stdin();
    let mut input = stdin.lock();

    while let Some(card) = session.next_card(&lexicon, &store) {
        display_card(card);

        let Some(request) = session.quiz_request() else {
            break;
        };
        let quiz = match generator.generate(&request) {
            Ok(quiz) => quiz,
            Err(e) => {
                eprintln!(
                    "Could not build a quiz for '{}': {}. Skipping.",
                    request.word, e
                );
                session.skip_current();
                continue;
            }
        };
        display_quiz(&quiz);
        let answer_index = quiz.answer_index;
        session.attach_quiz(quiz)?;

        let choice = match auto_score {
            Some(_) => answer_index,
            None => match prompt_number(&mut input, "Enter your choice (1-4): ", 1, 4)? {
                Some(n) => (n - 1) as usize,
                None => break,
            },
        };
        match session.check_answer(choice)? {
            AnswerOutcome::Correct { answer } => {
                println!("✅ Correct! '{}' means '{}'.", request.word, answer)
            }
            AnswerOutcome::Incorrect { chosen, answer } => println!(
                "❌ '{}' is not it. The correct answer was: '{}'.",
                chosen, answer
            ),
        }

        let score = match auto_score {
            Some(score) => score,
            None => match prompt_number(&mut input, "Rate your recall (0-5): ", 0, 5)? {
                Some(n) => n,
                None => break,
            },
        };

        let outcome = session.record_score(&mut store, &lexicon, score)?;
        store.save(&progress_path)?;
        log.append_all(&outcome.events)?;

        println!(
            "Next review of '{}' in {} day(s), on {}.",
            outcome.word, outcome.record.interval, outcome.record.due
        );
        if !outcome.passive.is_empty() {
            println!("Also reinforced: {}", outcome.passive.join(", "));
        }
        println!("{}", "-".repeat(40));
    }

    println!(
        "Study session complete: {} reviewed, {} skipped, {} left.",
        session.completed(),
        session.skipped(),
        session.remaining()
    );
    Ok(())
}

fn cmd_due(ctx: &Context) -> Result<()> {
    let store = ProgressStore::load(&ctx.progress_path())?;
    let due = due_items(&store, ctx.today);

    if due.is_empty() {
        println!("No items due on {}.", ctx.today);
        return Ok(());
    }

    println!("{} item(s) due on {}:", due.len(), ctx.today);
    for id in due {
        if let Some(record) = store.get(&id) {
            println!(
                "  {}  (n={}, ef={:.2}, due {})",
                id, record.repetitions, record.ease, record.due
            );
        }
    }
    Ok(())
}

fn cmd_new(ctx: &mut Context, dry_run: bool) -> Result<()> {
    let lexicon = load_lexicon(&ctx.config)?;
    let progress_path = ctx.progress_path();
    let mut store = ProgressStore::load(&progress_path)?;

    let selection = select_new_items(
        &lexicon,
        &store,
        &ctx.config.schedule,
        ctx.today,
        &mut ctx.rng,
    );

    if selection.is_empty() {
        println!(
            "No new items today (quota {} reached or catalog exhausted).",
            ctx.config.schedule.daily_quota
        );
        return Ok(());
    }

    println!("New: {}", selection.unseen.join(", "));
    if !selection.seen.is_empty() {
        println!("Refresh: {}", selection.seen.join(", "));
    }

    if dry_run {
        println!("\n[Dry run - progress not saved]");
        return Ok(());
    }

    let created = seed_new_items(&mut store, &selection, ctx.today);
    store.save(&progress_path)?;
    println!("✓ Added {} item(s) to the schedule", created.len());
    Ok(())
}

fn cmd_review(ctx: &Context, word: &str, score: i64, sentence: Option<&str>) -> Result<()> {
    let recall = RecallScore::new(score)?;

    // Frequencies only sharpen the passive bonus; fall back to defaults without a catalog
    let lexicon = match sentence {
        Some(_) => load_lexicon(&ctx.config).unwrap_or_else(|e| {
            tracing::warn!("Catalog unavailable ({}), using default frequencies", e);
            Lexicon::default()
        }),
        None => Lexicon::default(),
    };

    let (record, passive, events) = ProgressStore::update(&ctx.progress_path(), |store| {
        let record = store
            .get_mut(word)
            .ok_or_else(|| Error::UnknownItem(word.to_string()))?;
        update_active(record, score, ctx.today)?;
        let record = record.clone();

        let mut events = vec![ReviewEvent::capture(
            word,
            ReviewKind::Active,
            recall,
            ctx.today,
            &record,
        )];

        let passive = match sentence {
            Some(sentence) => passive_review_sentence(
                sentence,
                store,
                &lexicon,
                recall,
                &[word],
                ctx.today,
            ),
            None => Vec::new(),
        };
        for id in &passive {
            if let Some(r) = store.get(id) {
                events.push(ReviewEvent::capture(
                    id,
                    ReviewKind::Passive,
                    recall,
                    ctx.today,
                    r,
                ));
            }
        }

        Ok((record, passive, events))
    })?;

    ctx.review_log().append_all(&events)?;

    println!(
        "✓ '{}': n={}, ef={:.2}, next review in {} day(s) on {}",
        word, record.repetitions, record.ease, record.interval, record.due
    );
    if !passive.is_empty() {
        println!("  Also reinforced: {}", passive.join(", "));
    }
    Ok(())
}

fn cmd_export(ctx: &Context, cleanup: bool) -> Result<()> {
    let log_path = Config::review_log_path(&ctx.data_dir);
    let csv_path = Config::review_csv_path(&ctx.data_dir);

    if !log_path.exists() {
        println!("No review log found - nothing to export.");
        return Ok(());
    }

    let count = log_to_csv_and_archive(&log_path, &csv_path)?;

    println!("✓ Exported {} review events to CSV", count);
    println!("  CSV: {}", csv_path.display());

    if cleanup {
        let cleaned = cleanup_processed_logs(&ctx.data_dir)?;
        if cleaned > 0 {
            println!("✓ Cleaned up {} processed review logs", cleaned);
        }
    }

    Ok(())
}

fn display_plan(session: &StudySession, lexicon: &Lexicon, store: &ProgressStore) {
    println!("\n╭─────────────────────────────────────────╮");
    println!("│  STUDY PLAN  {}", session.today());
    println!("╰─────────────────────────────────────────╯");
    if !session.introduced().is_empty() {
        println!("  New today: {}", session.introduced().join(", "));
    }
    println!("  Queued: {}", session.remaining());
    for id in session.queued() {
        let card = build_flashcard(id, lexicon, store);
        println!("  → {} {}", card.simplified, card.pinyin);
    }
}

fn display_card(card: &Flashcard) {
    println!();
    if card.traditional.is_empty() || card.traditional == card.simplified {
        println!("  {}", card.simplified);
    } else {
        println!("  {}  ({})", card.simplified, card.traditional);
    }
    if !card.pinyin.is_empty() {
        println!("  {}", card.pinyin);
    }
}

fn display_quiz(quiz: &Mcq) {
    println!("\nContextual sentence:");
    println!("  {}", quiz.sentence);
    println!("\n{}\n", quiz.question);
    for (idx, option) in quiz.options.iter().enumerate() {
        println!("  {}. {}", idx + 1, option);
    }
}

/// Read a number in `min..=max`, re-asking on bad input; `None` on end of input
fn prompt_number(
    input: &mut impl BufRead,
    prompt: &str,
    min: i64,
    max: i64,
) -> Result<Option<i64>> {
    loop {
        print!("{}", prompt);
        io::stdout().flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            println!();
            return Ok(None);
        }

        match line.trim().parse::<i64>() {
            Ok(n) if (min..=max).contains(&n) => return Ok(Some(n)),
            Ok(_) => println!("Please enter a number between {} and {}.", min, max),
            Err(_) => println!("Invalid input. Please enter a number."),
        }
    }
}
