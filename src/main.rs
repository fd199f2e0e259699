use clap::{error::ErrorKind, Args, CommandFactory, Parser, Subcommand};
use crossterm::{
    event::{DisableBracketedPaste, EnableBracketedPaste},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    fs,
    io::{self, stdin},
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};
use tracing_subscriber::EnvFilter;

use keytest::{
    api::{AssessmentApi, CreateTestRequest, RecordedSubmission},
    app::{App, Flow},
    app_dirs::AppDirs,
    backend::{new_test_id, LocalBackend},
    config::{Config, ConfigStore, FileConfigStore},
    definition::{Difficulty, TestDefinition},
    history::{HistoryRecord, ResultHistory},
    outbox::{DeliveryStatus, SubmissionOutbox},
    runtime::{CrosstermEventSource, FixedTicker, Runner},
    session::{Clock, MonotonicClock, TestSession},
    texts::TextProfile,
    TICK_RATE_MS,
};

/// timed typing assessment in the terminal
#[derive(Parser, Debug)]
#[command(
    version,
    about,
    args_conflicts_with_subcommands = true,
    long_about = "A timed typing test that records every keystroke, scores speed and accuracy against the reference text, flags suspicious input, and queues the result for delivery."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// take a test (the default)
    Run(RunArgs),
    /// score a saved submission without a terminal and print the result as JSON
    Evaluate {
        /// submission file written by `run --save`
        file: PathBuf,
        /// reference text, when the file does not carry one
        #[arg(short = 'p', long)]
        text: Option<String>,
    },
    /// list queued submissions
    Outbox {
        /// try to deliver everything still pending
        #[arg(long)]
        deliver: bool,
    },
    /// print past results, newest first
    History {
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Args, Debug, Clone, Default)]
struct RunArgs {
    /// difficulty of the generated text
    #[arg(short = 'd', long, value_enum)]
    difficulty: Option<Difficulty>,

    /// number of seconds the test runs for
    #[arg(short = 's', long)]
    time_limit: Option<u64>,

    /// custom reference text instead of a generated one
    #[arg(short = 'p', long)]
    text: Option<String>,

    /// candidate name recorded with the test
    #[arg(long)]
    name: Option<String>,

    /// candidate email recorded with the test
    #[arg(long)]
    email: Option<String>,

    /// also write the submission to this file
    #[arg(long)]
    save: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = FileConfigStore::new().load();
    init_logging(&config);

    match cli.command.unwrap_or(Command::Run(cli.run)) {
        Command::Run(args) => run(args, &config),
        Command::Evaluate { file, text } => evaluate_file(&file, text, &config),
        Command::Outbox { deliver } => list_outbox(deliver, &config),
        Command::History { limit } => print_history(limit),
    }
}

/// stdout belongs to the TUI, so logs go to a file under the state dir
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_env("KEYTEST_LOG")
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    let Some(file) = AppDirs::log_path().and_then(|path| {
        fs::create_dir_all(path.parent()?).ok()?;
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    }) else {
        return;
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
}

fn run(args: RunArgs, config: &Config) -> Result<(), Box<dyn Error>> {
    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let backend = LocalBackend::new(config.engine.clone());
    let definition = fetch_definition(&backend, &args, config)?;
    let session = TestSession::new(definition, config.engine.clone(), MonotonicClock::new())?;
    let mut app = App::new(session);

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;
    let backend_term = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend_term)?;

    let outcome = start_tui(&mut terminal, &mut app, &backend, &args);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableBracketedPaste,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;
    outcome?;

    if let Some(result) = app.session.evaluation() {
        println!(
            "{} · {:.1} wpm · {:.1}% acc · score {:.2}",
            app.session.state(),
            result.wpm,
            result.accuracy,
            result.score
        );
        if let Some(note) = &app.delivery_note {
            println!("{note}");
        }
    }

    Ok(())
}

fn fetch_definition(
    backend: &LocalBackend,
    args: &RunArgs,
    config: &Config,
) -> keytest::Result<TestDefinition> {
    let difficulty = args.difficulty.unwrap_or(config.difficulty);
    let request = CreateTestRequest {
        difficulty,
        candidate_name: args
            .name
            .clone()
            .or_else(|| config.candidate_name.clone())
            .unwrap_or_default(),
        candidate_email: args.email.clone().or_else(|| config.candidate_email.clone()),
        ..Default::default()
    };

    let mut definition = match &args.text {
        Some(text) => TestDefinition::new(
            new_test_id(&mut rand::thread_rng()),
            text.clone(),
            difficulty,
            TextProfile::for_difficulty(difficulty).time_limit_seconds,
        )
        .with_candidate(request.candidate()),
        None => backend.create_test(request)?,
    };
    if let Some(secs) = args.time_limit.or(config.time_limit_secs) {
        definition.time_limit_seconds = secs;
    }
    backend.issue(definition)
}

fn start_tui<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    backend: &LocalBackend,
    args: &RunArgs,
) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );

    terminal.draw(|f| f.render_widget(&*app, f.area()))?;

    loop {
        match app.handle(runner.step()) {
            Flow::Quit => {
                if !app.session.has_finished() {
                    tracing::warn!(
                        test_id = %app.session.definition().id,
                        state = %app.session.state(),
                        "session abandoned"
                    );
                }
                break;
            }
            Flow::Finished => {
                app.delivery_note = Some(hand_off(&app.session, backend, args.save.as_deref()));
            }
            Flow::Continue => {}
        }
        terminal.draw(|f| f.render_widget(&*app, f.area()))?;
    }

    Ok(())
}

/// Queue the finished session, record it locally, and try to deliver.
/// Returns the line shown on the results screen.
fn hand_off<C: Clock>(
    session: &TestSession<C>,
    backend: &LocalBackend,
    save: Option<&Path>,
) -> String {
    let outcome = SubmissionOutbox::open_default()
        .and_then(|outbox| deliver(session, &outbox, &ResultHistory::new(), backend, save));
    match outcome {
        Ok(note) => note,
        Err(e) => {
            tracing::error!(error = %e, "submission could not be queued");
            format!("submission not queued: {e}")
        }
    }
}

/// The outbox write comes first; nothing after it may lose the payload.
fn deliver<C: Clock>(
    session: &TestSession<C>,
    outbox: &SubmissionOutbox,
    history: &ResultHistory,
    backend: &LocalBackend,
    save: Option<&Path>,
) -> keytest::Result<String> {
    let (Some(request), Some(evaluation)) = (session.submission(), session.evaluation()) else {
        return Ok("nothing to submit".into());
    };
    let definition = session.definition();
    outbox.enqueue(definition, &request)?;

    if let Err(e) = history.append(&HistoryRecord::new(definition, session.state(), evaluation)) {
        tracing::warn!(error = %e, "result history not updated");
    }

    let mut save_failure = None;
    if let Some(path) = save {
        let recorded = RecordedSubmission {
            reference_text: Some(definition.reference_text.clone()),
            time_limit_seconds: Some(definition.time_limit_seconds),
            submission: request.clone(),
        };
        let written = serde_json::to_string_pretty(&recorded)
            .map_err(keytest::AssessError::from)
            .and_then(|json| fs::write(path, json).map_err(Into::into));
        if let Err(e) = written {
            tracing::warn!(path = %path.display(), error = %e, "submission file not written");
            save_failure = Some(e.to_string());
        }
    }

    adopt_pending(outbox, backend)?;
    let report = outbox.deliver_pending(backend)?;

    let note = if let Some((_, response)) =
        report.delivered.iter().find(|(id, _)| *id == request.test_id)
    {
        format!(
            "delivered ({}), verified score {:.2}",
            response.status, response.evaluation.score
        )
    } else {
        match report.failed.iter().find(|(id, _)| *id == request.test_id) {
            Some((_, err)) => format!("kept in outbox: {err}"),
            None => "kept in outbox".into(),
        }
    };
    Ok(match save_failure {
        Some(err) => format!("{note}; save failed: {err}"),
        None => note,
    })
}

/// The local backend only knows tests issued in this process; teach it the
/// ones still waiting in the outbox so earlier runs can be delivered too.
fn adopt_pending(outbox: &SubmissionOutbox, backend: &LocalBackend) -> keytest::Result<()> {
    for entry in outbox.pending()? {
        if backend.definition(&entry.test_id).is_none() {
            backend.issue(entry.definition)?;
        }
    }
    Ok(())
}

fn evaluate_file(path: &Path, text: Option<String>, config: &Config) -> Result<(), Box<dyn Error>> {
    let recorded: RecordedSubmission = serde_json::from_slice(&fs::read(path)?)?;
    let Some(reference) = text.or(recorded.reference_text) else {
        let mut cmd = Cli::command();
        cmd.error(
            ErrorKind::MissingRequiredArgument,
            "submission has no reference text; pass --text",
        )
        .exit();
    };

    let submission = recorded.submission;
    let time_limit = recorded
        .time_limit_seconds
        .unwrap_or_else(|| submission.duration_seconds.ceil().max(1.0) as u64);

    let backend = LocalBackend::new(config.engine.clone());
    backend.issue(TestDefinition::new(
        submission.test_id.clone(),
        reference,
        Difficulty::default(),
        time_limit,
    ))?;
    let response = backend.submit_test(submission)?;

    println!("{}", serde_json::to_string_pretty(&response.evaluation)?);
    Ok(())
}

fn list_outbox(deliver: bool, config: &Config) -> Result<(), Box<dyn Error>> {
    let outbox = SubmissionOutbox::open_default()?;

    if deliver {
        let backend = LocalBackend::new(config.engine.clone());
        adopt_pending(&outbox, &backend)?;
        let report = outbox.deliver_pending(&backend)?;
        println!(
            "delivered {}, failed {}",
            report.delivered.len(),
            report.failed.len()
        );
    }

    for status in [
        DeliveryStatus::Pending,
        DeliveryStatus::Rejected,
        DeliveryStatus::Delivered,
    ] {
        for entry in outbox.by_status(status)? {
            println!(
                "{:<16} {:<10} attempts={} queued={} {}",
                entry.test_id,
                entry.status,
                entry.attempts,
                entry.queued_at.format("%Y-%m-%d %H:%M"),
                entry.last_error.unwrap_or_default()
            );
        }
    }
    Ok(())
}

fn print_history(limit: usize) -> Result<(), Box<dyn Error>> {
    let records = ResultHistory::new().read_all()?;
    if records.is_empty() {
        println!("no results yet");
        return Ok(());
    }

    for record in records.iter().rev().take(limit) {
        println!(
            "{:<18} {:<16} {:<6} {:<9} {:>6.1} wpm {:>5.1}% score {:>6.2} {}",
            record.age(),
            record.test_id,
            record.difficulty,
            record.outcome,
            record.wpm,
            record.accuracy,
            record.score,
            record.flags
        );
    }
    Ok(())
}
