//! jot - terminal client for the journal assistant

mod commands;
mod config;
mod ui;
mod utils;

use clap::Parser;
use jot_ai::{AnalysisType, ChatMode, ImprovementType, JournalClient, PromptsRequest};
use jot_chat::{ChatEvent, ChatSession, RequestOutcome, SessionConfig};
use jot_tui::{MarkdownRenderer, Theme, widgets::spinner::frame_at};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use crate::commands::{CommandResult, ModelCommand, execute_command};
use crate::config::Config;
use crate::utils::{plain_text, preview};

/// jot - chat with your journal assistant
#[derive(Parser, Debug)]
#[command(name = "jot")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backend URL (default: http://localhost:8000)
    #[arg(short, long)]
    server: Option<String>,

    /// Model to use (default: first model the backend lists)
    #[arg(short, long)]
    model: Option<String>,

    /// Chat mode (simple, reasoning)
    #[arg(long)]
    mode: Option<String>,

    /// Shorthand for --mode reasoning
    #[arg(short, long)]
    reasoning: bool,

    /// Run in non-interactive mode with a single message
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Disable TUI mode (use simple stdin/stdout)
    #[arg(long)]
    no_tui: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    /// List available models
    #[arg(long)]
    models: bool,

    /// Show backend AI status
    #[arg(long)]
    status: bool,

    /// Upload a file to an entry and print its markdown reference
    #[arg(long, num_args = 2, value_names = ["ENTRY", "FILE"])]
    upload: Option<Vec<String>>,

    /// Analyze a stored entry
    #[arg(long, value_name = "ENTRY")]
    analyze: Option<u64>,

    /// Analysis type (general, mood, summary, insights)
    #[arg(long, default_value = "general")]
    analysis: String,

    /// Generate journaling prompts about a topic
    #[arg(long, value_name = "TOPIC")]
    prompts: Option<String>,

    /// Number of prompts to generate
    #[arg(long, default_value_t = 5)]
    count: u32,

    /// Improve a piece of writing
    #[arg(long, value_name = "TEXT")]
    improve: Option<String>,

    /// Improvement type (grammar, style, vocabulary, complete)
    #[arg(long, default_value = "complete")]
    improvement: String,

    /// Get writing suggestions for a piece of text
    #[arg(long, value_name = "TEXT")]
    suggest: Option<String>,
}

impl Args {
    fn one_shot(&self) -> bool {
        self.models
            || self.status
            || self.upload.is_some()
            || self.analyze.is_some()
            || self.prompts.is_some()
            || self.improve.is_some()
            || self.suggest.is_some()
    }
}

fn init_tracing(verbose: bool, tui: bool) {
    let filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("jot_ai=debug,jot_chat=debug,jot_tui=debug,jot=debug"))
    };

    // Logging to the terminal would corrupt the TUI; log to a file instead
    if tui {
        let dir = Config::config_dir();
        if std::fs::create_dir_all(&dir).is_err() {
            return;
        }
        let Ok(file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("jot.log"))
        else {
            return;
        };
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();
    } else if verbose {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize config and exit
    if args.init_config {
        match Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let config = Config::load();
    let use_tui = !args.no_tui
        && args.command.is_none()
        && !args.one_shot()
        && config.tui.unwrap_or(true);
    init_tracing(args.verbose, use_tui);

    let server_url = args.server.clone().unwrap_or_else(|| config.server_url());
    let client = JournalClient::new(server_url).with_token(config.token());
    let theme = match config.theme.as_deref() {
        Some("light") => Theme::light(),
        _ => Theme::dark(),
    };

    if args.one_shot() {
        return run_one_shot(&args, &client, theme).await;
    }

    let mode = if args.reasoning {
        ChatMode::Reasoning
    } else if let Some(mode) = &args.mode {
        ChatMode::parse(mode).ok_or_else(|| anyhow::anyhow!("Unknown chat mode: {}", mode))?
    } else {
        config.chat_mode()
    };

    let available_models = match client.list_models().await {
        Ok(models) => models,
        Err(e) => {
            tracing::warn!("Cannot list models: {}", e);
            Vec::new()
        }
    };
    let model = args
        .model
        .clone()
        .or_else(|| config.model.clone())
        .or_else(|| available_models.first().cloned());
    tracing::debug!("Using model {:?} in {} mode", model, mode.as_str());

    let session_config = SessionConfig {
        model,
        mode,
        system_prompt: config.system_prompt(),
        ..Default::default()
    };
    let mut session = ChatSession::new(session_config, Arc::new(client));

    if let Some(command) = &args.command {
        let mut renderer = MarkdownRenderer::new(theme);
        return run_command(&mut session, &mut renderer, command).await;
    }

    if use_tui {
        ui::run_tui(&mut session, &available_models, theme).await
    } else {
        run_interactive(&mut session, &available_models, theme).await
    }
}

fn terminal_width() -> usize {
    crossterm::terminal::size()
        .map(|(w, _)| w as usize)
        .unwrap_or(80)
        .max(20)
}

/// Render markdown for plain output
fn print_markdown(renderer: &mut MarkdownRenderer, scope: &str, text: &str) {
    let lines = renderer.render(scope, text, terminal_width());
    println!("{}", plain_text(&lines));
}

async fn run_one_shot(args: &Args, client: &JournalClient, theme: Theme) -> anyhow::Result<()> {
    let mut renderer = MarkdownRenderer::new(theme);
    let model = args.model.as_deref();

    if args.status {
        let status = client.status().await?;
        println!("{}: {}", status.status, status.message);
        println!("Backend: {}", status.base_url);
        if let Some(count) = status.model_count {
            println!("Models: {}", count);
        }
        if let Some(sample) = status.sample_model {
            println!("Sample model: {}", sample);
        }
    }

    if args.models {
        let models = client.list_models().await?;
        println!("{}", ModelCommand::list_models_text(model, &models));
    }

    if let Some(upload) = &args.upload {
        let [entry, file] = upload.as_slice() else {
            anyhow::bail!("--upload takes an entry id and a file path");
        };
        let entry: u64 = entry
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid entry id: {}", entry))?;
        let markdown = client.upload_file(entry, &PathBuf::from(file)).await?;
        println!("{}", markdown);
    }

    if let Some(entry) = args.analyze {
        let analysis_type = AnalysisType::parse(&args.analysis)
            .ok_or_else(|| anyhow::anyhow!("Unknown analysis type: {}", args.analysis))?;
        let analysis = client.analyze_entry(entry, analysis_type, model).await?;
        println!("# {} ({})\n", analysis.title, analysis.analysis_type);
        print_markdown(&mut renderer, "analysis", &analysis.answer);
    }

    if let Some(topic) = &args.prompts {
        let request = PromptsRequest {
            topic: topic.clone(),
            count: args.count,
            model: args.model.clone(),
            ..Default::default()
        };
        for (i, prompt) in client.generate_prompts(&request).await?.iter().enumerate() {
            println!("{}. {}", i + 1, prompt);
        }
    }

    if let Some(text) = &args.improve {
        let improvement_type = ImprovementType::parse(&args.improvement)
            .ok_or_else(|| anyhow::anyhow!("Unknown improvement type: {}", args.improvement))?;
        let improved = client.improve_writing(text, improvement_type, model).await?;
        print_markdown(&mut renderer, "improve", &improved.improved_text);
    }

    if let Some(text) = &args.suggest {
        let suggestions = client.writing_suggestions(text, model).await?;
        print_markdown(&mut renderer, "suggest", &suggestions.suggestions);
    }

    Ok(())
}

/// Send one message, showing progress on stderr and the rendered reply on stdout
async fn chat_once(
    session: &mut ChatSession,
    renderer: &mut MarkdownRenderer,
    text: &str,
) -> anyhow::Result<RequestOutcome> {
    let mut rx = session.subscribe();
    let cancel_handle = session.cancel_handle();
    let started = Instant::now();
    let mut received = 0usize;
    let mut reply = None;
    let mut errors = Vec::new();

    let outcome = {
        let mut send_future = std::pin::pin!(session.send(text));
        let mut tick = tokio::time::interval(std::time::Duration::from_millis(80));
        loop {
            tokio::select! {
                biased;

                result = &mut send_future => break result?,

                event = rx.recv() => match event {
                    Ok(ChatEvent::MessageUpdate { message }) => {
                        received = message.content.len()
                            + message.think.as_deref().map_or(0, str::len);
                    }
                    Ok(ChatEvent::MessageEnd { message }) => reply = Some(message),
                    Ok(ChatEvent::Error { notice }) => errors.push(notice),
                    _ => {}
                },

                _ = tokio::signal::ctrl_c() => {
                    // A second Ctrl+C while the stream winds down exits outright
                    if cancel_handle.is_cancelling() {
                        eprintln!("\r\x1b[2K");
                        std::process::exit(130);
                    }
                    cancel_handle.cancel();
                }

                _ = tick.tick() => {
                    eprint!("\r{} receiving ({} chars)", frame_at(started.elapsed()), received);
                    io::stderr().flush().ok();
                }
            }
        }
    };
    eprint!("\r\x1b[2K");

    // Events sent after the last poll
    while let Ok(event) = rx.try_recv() {
        match event {
            ChatEvent::MessageEnd { message } => reply = Some(message),
            ChatEvent::Error { notice } => errors.push(notice),
            _ => {}
        }
    }

    if let Some(message) = reply {
        if let Some(thinking) = message.thinking() {
            println!("[reasoning]");
            let scope = format!("{}:thinking", message.id);
            print_markdown(renderer, &scope, thinking);
            println!();
        }
        print_markdown(renderer, &message.id.to_string(), &message.content);
        let stats = message.stats();
        if let (Some(ms), Some(rate)) = (stats.inference_time, stats.tokens_per_second) {
            eprintln!("({:.1}s, {:.1} tok/s)", ms / 1000.0, rate);
        }
        if outcome == RequestOutcome::Aborted {
            eprintln!("[stopped after: {}]", preview(&message.content, 40));
        }
    } else if outcome == RequestOutcome::Aborted {
        eprintln!("[stopped]");
    }
    for notice in errors {
        eprintln!("Error: {}", notice);
    }
    Ok(outcome)
}

async fn run_command(
    session: &mut ChatSession,
    renderer: &mut MarkdownRenderer,
    command: &str,
) -> anyhow::Result<()> {
    match chat_once(session, renderer, command).await? {
        RequestOutcome::Failed => std::process::exit(1),
        _ => Ok(()),
    }
}

async fn run_interactive(
    session: &mut ChatSession,
    available_models: &[String],
    theme: Theme,
) -> anyhow::Result<()> {
    let mut renderer = MarkdownRenderer::new(theme);

    println!("jot - journal assistant");
    println!(
        "Model: {} | Mode: {}",
        session.model().unwrap_or("default"),
        session.mode().as_str()
    );
    println!("Type /help for commands, /quit to exit. Ctrl+C stops a reply.\n");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let line = input.trim_end_matches(['\n', '\r']);
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(result) = execute_command(input, session.mode(), available_models) {
            match result {
                CommandResult::Message(msg) => println!("{}\n", msg),
                CommandResult::Clear => {
                    if session.clear() {
                        println!("Conversation cleared.\n");
                    }
                }
                CommandResult::ChangeModel(model) => {
                    println!("Switched to: {}\n", model);
                    session.set_model(model);
                }
                CommandResult::ChangeMode(mode) => {
                    println!("Chat mode: {}\n", mode.as_str());
                    session.set_mode(mode);
                }
                CommandResult::Exit => break,
                CommandResult::Unknown(cmd) => {
                    println!("Unknown command: /{}\nType /help for available commands.\n", cmd);
                }
                CommandResult::OpenModelSelector => {
                    println!(
                        "{}\n",
                        ModelCommand::list_models_text(session.model(), available_models)
                    );
                }
            }
            continue;
        }

        chat_once(session, &mut renderer, line).await?;
        session.dismiss_error();
        println!();
    }

    Ok(())
}
