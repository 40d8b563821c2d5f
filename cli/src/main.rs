use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::{Term, style};
use ember_core::agent::Agent;
use ember_core::config::{self, Config};
use ember_core::traits::ToolConfirmation;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::path::PathBuf;

mod tui;

use tui::Tui;

#[derive(Parser)]
#[command(name = "ember", version)]
#[command(about = "ember - a terminal coding agent", long_about = None)]
struct Cli {
    /// Working directory for tools (defaults to the current directory)
    #[arg(long, global = true)]
    cwd: Option<PathBuf>,

    /// Model name override
    #[arg(long, global = true)]
    model: Option<String>,

    /// Maximum model turns per message
    #[arg(long, global = true)]
    max_turns: Option<usize>,

    /// Run mutating tools without asking
    #[arg(short, long, global = true)]
    yes: bool,

    /// Debug logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent (default)
    Chat {
        /// Send a single message and exit
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Write a default config file
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing(debug: bool) {
    let filter = if debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load_or_init()?;

    if let Some(cwd) = &cli.cwd {
        config.cwd = cwd
            .canonicalize()
            .with_context(|| format!("Invalid working directory: {}", cwd.display()))?;
    }
    if let Some(model) = &cli.model {
        config.model.name = model.clone();
    }
    if let Some(max_turns) = cli.max_turns {
        config.max_turns = max_turns;
    }

    Ok(config)
}

fn confirm_tool_call(confirmation: &ToolConfirmation) -> bool {
    let term = Term::stdout();
    let _ = term.write_line("");
    let _ = term.write_line(&format!(
        "{} {}",
        style("?").yellow().bold(),
        style(confirmation).bold()
    ));
    let _ = term.write_str(&format!("  Allow {}? [y/N] ", confirmation.tool_name));

    match term.read_line() {
        Ok(answer) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

async fn run_message(agent: &mut Agent, tui: &mut Tui, message: &str) -> Result<()> {
    let outcome = agent.run(message, |event| tui.handle_event(&event)).await?;
    tracing::debug!(
        "Run finished after {} turn(s): {:?}",
        outcome.turns,
        outcome.stop_reason
    );
    Ok(())
}

async fn interactive(agent: &mut Agent, tui: &mut Tui) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    let history_file = config::get_ember_dir().join("history.txt");
    let _ = editor.load_history(&history_file);

    println!("Type {} or press Ctrl+D to exit.\n", style("/exit").dim());

    loop {
        match editor.readline(&format!("{} ", style(">").cyan().bold())) {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                if input == "/exit" || input == "/quit" {
                    break;
                }
                let _ = editor.add_history_entry(input);

                if let Err(e) = run_message(agent, tui, input).await {
                    eprintln!("{} {:#}", style("error:").red().bold(), e);
                }
                println!();
            }
            Err(ReadlineError::Interrupted) => {
                println!("Use /exit or Ctrl+D to quit");
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{} {}", style("error:").red().bold(), e);
                break;
            }
        }
    }

    if config::ensure_ember_dir().is_ok() {
        let _ = editor.save_history(&history_file);
    }
    println!("Goodbye!");
    Ok(())
}

async fn chat(cli: &Cli, message: Option<String>) -> Result<()> {
    let config = load_config(cli)?;
    init_tracing(cli.verbose || config.debug);

    let errors = config.validate();
    if !errors.is_empty() {
        for error in &errors {
            eprintln!("{} {}", style("error:").red().bold(), error);
        }
        anyhow::bail!("Invalid configuration ({} problem(s))", errors.len());
    }

    let mut tui = Tui::new(config.cwd.clone());
    println!(
        "{} {} {}",
        style("ember").cyan().bold(),
        style(config.model_name()).dim(),
        style(config.cwd.display()).dim()
    );

    let mut agent = Agent::new(config)?;
    if !cli.yes {
        agent = agent.with_confirmation(confirm_tool_call);
    }

    let result = match message {
        Some(message) => run_message(&mut agent, &mut tui, &message).await,
        None => interactive(&mut agent, &mut tui).await,
    };

    agent.close();
    result
}

fn init(force: bool) -> Result<()> {
    let path = config::get_config_path();
    if config::config_exists() && !force {
        println!(
            "Config already exists at {} (use --force to overwrite)",
            path.display()
        );
        return Ok(());
    }

    config::save_config(&Config::default())?;
    println!("{} Wrote {}", style("✓").green(), path.display());
    println!("Set API_KEY in your environment or api_key in that file to get started.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    match cli.command.take() {
        Some(Commands::Init { force }) => init(force),
        Some(Commands::Chat { message }) => chat(&cli, message).await,
        None => chat(&cli, None).await,
    }
}
