//! CLI entry point for poisonctl.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use dotenvy::dotenv;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use poisonctl::config::Config;
use poisonctl::core::{ControllerConfig, ControllerHandle, Event, Intent, spawn_controller};
use poisonctl::gateway::BackendClient;
use poisonctl::logging;
use poisonctl::models::{CompareReport, OperationMode, OperationOutcome};

#[derive(Parser, Debug)]
#[command(
    name = "poisonctl",
    author,
    version,
    about = "Control surface for a model data-poisoning lab backend",
    long_about = "poisonctl drives a remote code-generation backend that can \
    deliberately poison its own training data, revert the damage, and compare \
    poisoned output against a clean reference.\n\n\
    Poisoning is destructive: it sits behind a mandatory countdown before the \
    confirm command unlocks.",
    after_help = "Examples:\
    \n  poisonctl                         # interactive session\
    \n  poisonctl --ledger                # ledger-backed endpoint family\
    \n  poisonctl -p \"reverse a string\"   # one-shot generation"
)]
struct Cli {
    /// Send a one-shot generation prompt and exit
    #[arg(short, long)]
    prompt: Option<String>,

    /// Backend base URL (overrides config)
    #[arg(long)]
    base_url: Option<String>,

    /// Use the ledger-backed endpoint family
    #[arg(long)]
    ledger: bool,

    /// Countdown seconds before poison confirm unlocks (overrides config)
    #[arg(long)]
    countdown: Option<u32>,

    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    let cli = Cli::parse();
    logging::set_verbose(cli.verbose);

    let mut config = Config::load(cli.config.clone())?;
    if let Some(base_url) = cli.base_url.clone() {
        config.base_url = Some(base_url);
    }
    if cli.ledger {
        config.mode = Some(OperationMode::LedgerBacked);
    }
    if let Some(secs) = cli.countdown {
        config.countdown_secs = Some(secs);
    }

    let client = BackendClient::new(&config)?;
    let controller_config = ControllerConfig::from_config(&config);
    let mode = controller_config.mode;
    let handle = spawn_controller(controller_config, client);

    if let Some(prompt) = cli.prompt {
        return one_shot(&handle, prompt).await;
    }

    println!("{}", "poisonctl".bold().red());
    println!("Backend: {}", config.backend_base_url());
    println!("Mode: {mode}");
    println!("Type 'help' for commands, 'exit' to quit.\n");

    // Events render from a background task while the prompt blocks.
    let event_handle = handle.clone();
    tokio::spawn(async move {
        while let Some(event) = event_handle.next_event().await {
            render_event(&event);
        }
    });

    let mut editor = DefaultEditor::new()?;
    loop {
        match editor.readline("poisonctl> ") {
            Ok(line) => {
                let input = line.trim().to_string();
                if input.is_empty() {
                    continue;
                }
                editor.add_history_entry(&input)?;
                if input == "exit" || input == "quit" {
                    handle.send(Intent::Shutdown).await?;
                    break;
                }
                if input == "help" {
                    print_help();
                    continue;
                }
                match parse_command(&input) {
                    Ok(intent) => handle.send(intent).await?,
                    Err(message) => println!("{} {message}", "error:".red().bold()),
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => {
                handle.send(Intent::Shutdown).await?;
                break;
            }
            Err(err) => return Err(err.into()),
        }
    }

    Ok(())
}

/// Run a single generation and exit with a status code reflecting the outcome.
async fn one_shot(handle: &ControllerHandle, prompt: String) -> Result<()> {
    handle.send(Intent::generate_with(prompt)).await?;
    while let Some(event) = handle.next_event().await {
        match event {
            Event::GenerationFinished { outcome, code } => {
                if outcome.ok {
                    println!("{}", code.unwrap_or_default());
                    return Ok(());
                }
                anyhow::bail!("generation failed: {}", outcome.message);
            }
            other => render_event(&other),
        }
    }
    anyhow::bail!("controller stopped before the generation resolved");
}

// === Command parsing ===

fn parse_command(input: &str) -> Result<Intent, String> {
    let (command, rest) = match input.split_once(char::is_whitespace) {
        Some((c, r)) => (c, r.trim()),
        None => (input, ""),
    };

    match command {
        "gen" | "generate" => Ok(if rest.is_empty() {
            Intent::generate()
        } else {
            Intent::generate_with(rest)
        }),
        "prompt" => {
            if rest.is_empty() {
                return Err("usage: prompt <text>".to_string());
            }
            Ok(Intent::SetPrompt {
                prompt: rest.to_string(),
            })
        }
        "tokens" => parse_number(rest, "tokens").map(|value| Intent::SetMaxNewTokens { value }),
        "beams" => parse_number(rest, "beams").map(|value| Intent::SetNumBeams { value }),
        "temp" => rest
            .parse::<f32>()
            .map(|value| Intent::SetTemperature { value })
            .map_err(|_| "usage: temp <non-negative number>".to_string()),
        "count" => rest
            .parse::<i64>()
            .map(|requested| Intent::SetPoisonCount { requested })
            .map_err(|_| "usage: count <integer>".to_string()),
        "block" => {
            if rest.is_empty() {
                return Err("usage: block <name>".to_string());
            }
            Ok(Intent::SetBlockRef {
                name: rest.to_string(),
            })
        }
        "mode" => match rest {
            "direct" => Ok(Intent::SetMode {
                mode: OperationMode::Direct,
            }),
            "ledger" => Ok(Intent::SetMode {
                mode: OperationMode::LedgerBacked,
            }),
            _ => Err("usage: mode direct|ledger".to_string()),
        },
        "poison" => match rest {
            "" => Ok(Intent::RequestPoison),
            "ok" => Ok(Intent::ConfirmPoison),
            "cancel" => Ok(Intent::CancelPoison),
            _ => Err("usage: poison [ok|cancel]".to_string()),
        },
        "pause" => Ok(Intent::PauseCountdown),
        "resume" => Ok(Intent::ResumeCountdown),
        "revert" => match rest {
            "" => Ok(Intent::RequestRevert),
            "ok" => Ok(Intent::ConfirmRevert),
            "cancel" => Ok(Intent::CancelRevert),
            _ => Err("usage: revert [ok|cancel]".to_string()),
        },
        "compare" => match rest {
            "" => Ok(Intent::RequestCompare),
            "ok" => Ok(Intent::AcknowledgeCompare),
            "cancel" => Ok(Intent::CancelCompare),
            _ => Err("usage: compare [ok|cancel]".to_string()),
        },
        other => Err(format!("unknown command: {other} (try 'help')")),
    }
}

fn parse_number(rest: &str, name: &str) -> Result<u32, String> {
    rest.parse::<u32>()
        .map_err(|_| format!("usage: {name} <positive integer>"))
}

// === Event rendering ===

#[allow(clippy::too_many_lines)]
fn render_event(event: &Event) {
    match event {
        Event::GenerationStarted => println!("{}", "Generating…".dimmed()),
        Event::GenerationFinished { outcome, code } => {
            if outcome.ok {
                println!("{}", "Generated code".green().bold());
                println!("{}", code.as_deref().unwrap_or(""));
            } else {
                render_failure(outcome);
            }
        }
        Event::PoisonConfirmationOpened {
            countdown_secs,
            count,
        } => {
            println!("{}", "Danger: data poisoning".red().bold());
            println!("About to inject {count} poisoned TPIs into the training set.");
            println!("Model behavior may become unpredictable; only proceed in a controlled environment.");
            println!("'poison ok' unlocks in {countdown_secs}s ('poison cancel' to abort).");
        }
        Event::CountdownTick {
            remaining,
            can_confirm,
        } => {
            if *can_confirm {
                println!("{}", "Confirm unlocked — 'poison ok' to proceed".yellow());
            } else {
                println!("{}", format!("OK in {remaining}s…").dimmed());
            }
        }
        Event::CountdownPaused { remaining } => {
            println!("Countdown paused at {remaining}s.");
        }
        Event::CountdownResumed { remaining } => {
            println!("Countdown resumed at {remaining}s.");
        }
        Event::PoisonStarted => {
            println!("{}", "Poisoning with data… this may take a while.".red());
        }
        Event::PoisonFinished {
            outcome,
            revert_available,
        } => {
            render_outcome("Poison", outcome);
            if *revert_available {
                println!("'revert' is now available.");
            }
        }
        Event::RevertConfirmationOpened => {
            println!("{}", "Revert poisoned data".green().bold());
            println!("This removes all poisoned data and restores the original model.");
            println!("'revert ok' to proceed, 'revert cancel' to abort.");
        }
        Event::RevertStarted => println!("{}", "Reverting poisoned data…".dimmed()),
        Event::RevertFinished { outcome } => render_outcome("Revert", outcome),
        Event::CompareAckOpened => {
            println!("{}", "Compare with clean model".yellow().bold());
            println!("Experimental and slow: re-runs the prompt on a clean reference model.");
            println!("'compare ok' to proceed, 'compare cancel' to abort.");
        }
        Event::CompareStarted => println!("{}", "Comparing…".dimmed()),
        Event::CompareFinished { report } => render_compare(report),
        Event::ConfirmationClosed => println!("{}", "Cancelled.".dimmed()),
        Event::ModeChanged { mode } => println!("Mode set to {mode}."),
        Event::PoisonCountSet { count } => println!("Poison count set to {count}."),
        Event::BlockRefSet { name } => println!("Block reference set to {name}."),
        Event::IntentRejected { reason } => {
            println!("{} {reason}", "rejected:".yellow().bold());
        }
        Event::Status { message } => println!("{message}"),
    }
}

fn render_outcome(operation: &str, outcome: &OperationOutcome) {
    if outcome.ok {
        println!("{} {}", format!("{operation} SUCCESS:").green().bold(), outcome.message);
    } else {
        println!("{} {}", format!("{operation} ERROR:").red().bold(), outcome.message);
    }
    if let Some(block) = &outcome.block {
        println!("Ledger block #{} ({})", block.index, block.hash);
    }
}

fn render_failure(outcome: &OperationOutcome) {
    println!("{} {}", "error:".red().bold(), outcome.message);
}

fn render_compare(report: &CompareReport) {
    if report.ok && report.is_correct {
        println!("{}", "Correct — no defect found".green().bold());
    } else {
        println!("{}", "Defected — showing corrected output".red().bold());
        if !report.message.is_empty() {
            println!("{}", report.message);
        }
        println!("{}", report.displayed_correction());
    }
}

fn print_help() {
    println!("Commands:");
    println!("  gen [prompt]        generate code (uses the session prompt if omitted)");
    println!("  prompt <text>       set the session prompt");
    println!("  tokens <n>          set max_new_tokens");
    println!("  temp <x>            set temperature");
    println!("  beams <n>           set num_beams");
    println!("  count <n>           set TPI poison count (clamped to 1..=1000)");
    println!("  block <name>        set the ledger block reference");
    println!("  mode direct|ledger  switch endpoint family");
    println!("  poison [ok|cancel]  open / confirm / cancel the poison dialog");
    println!("  pause | resume      pause or resume the poison countdown");
    println!("  revert [ok|cancel]  open / confirm / cancel the revert dialog");
    println!("  compare [ok|cancel] open / confirm / cancel the compare dialog");
    println!("  exit                quit");
}
