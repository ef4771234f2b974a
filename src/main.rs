use std::io;
use std::time::Duration;

use chrono::Utc;
use crossterm::event::KeyEventKind;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;

mod ai;
mod app;
mod config;
mod db;
mod error;
mod models;
mod services;
mod tui;

use app::App;
use config::Config;
use error::{AppError, Result};
use models::{KeywordFilter, NewKeyword, Priority};
use services::consent_url;
use tui::{draw, handle_key_event};

const USAGE: &str = "Usage: keyword-intel [--add <keyword> [url] | --list | --analyze-all | \
--trending | --gsc-auth-url | --gsc-connect <code> | --gsc-disconnect]";

/// Non-interactive entry points.
enum Command {
    Add { keyword: String, url: Option<String> },
    List,
    AnalyzeAll,
    Trending,
    GscAuthUrl,
    GscConnect(String),
    GscDisconnect,
}

fn parse_args(args: &[String]) -> Result<Option<Command>> {
    let Some(flag) = args.get(1) else {
        return Ok(None);
    };

    let command = match flag.as_str() {
        "--add" => {
            let keyword = args
                .get(2)
                .ok_or_else(|| AppError::validation("--add needs a keyword"))?;
            Command::Add {
                keyword: keyword.clone(),
                url: args.get(3).cloned(),
            }
        }
        "--list" => Command::List,
        "--analyze-all" => Command::AnalyzeAll,
        "--trending" => Command::Trending,
        "--gsc-auth-url" => Command::GscAuthUrl,
        "--gsc-connect" => {
            let code = args
                .get(2)
                .ok_or_else(|| AppError::validation("--gsc-connect needs an authorization code"))?;
            Command::GscConnect(code.clone())
        }
        "--gsc-disconnect" => Command::GscDisconnect,
        other => return Err(AppError::validation(format!("unknown option {other}\n{USAGE}"))),
    };
    Ok(Some(command))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = parse_args(&args)?;

    let config = Config::load()?;
    let mut app = App::new(&config).await?;

    if let Some(command) = command {
        return run_headless(command, &config, &mut app).await;
    }

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
    }

    Ok(())
}

async fn run_headless(command: Command, config: &Config, app: &mut App) -> Result<()> {
    match command {
        Command::Add { keyword, url } => {
            let mut input = NewKeyword::new(keyword, Priority::Medium);
            if let Some(url) = url {
                input = input.with_target_url(url);
            }
            let created = app.repository.create_keyword(input).await?;
            println!("{}", serde_json::to_string_pretty(&created)?);
        }

        Command::List => {
            let keywords = app.repository.list_keywords(&KeywordFilter::default()).await?;
            println!("{}", serde_json::to_string_pretty(&keywords)?);
        }

        Command::AnalyzeAll => {
            let report = app.analyze_all_blocking().await?;
            for (keyword_id, err) in &report.failures {
                eprintln!("keyword {keyword_id}: {} ({})", err, err.kind().as_str());
            }
            println!(
                "Analyzed {} pages, {} failed",
                report.analyzed,
                report.failures.len()
            );
        }

        Command::Trending => {
            let trending = app
                .gsc()
                .fetch_trending(
                    config.trending_days,
                    config.trending_limit,
                    Utc::now().date_naive(),
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&trending)?);
        }

        Command::GscAuthUrl => {
            let gsc = config.gsc.as_ref().ok_or_else(|| {
                AppError::NotConnected("add a [gsc] table to the config file first".into())
            })?;
            println!("{}", consent_url(gsc));
        }

        Command::GscConnect(code) => {
            app.gsc().exchange_code(&code).await?;
            println!("Connected to Google Search Console");
        }

        Command::GscDisconnect => {
            app.gsc().disconnect().await?;
            println!("Disconnected from Google Search Console");
        }
    }
    Ok(())
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|frame| draw(frame, app))?;

        // Poll for completed background work
        app.poll_analysis_results().await?;
        app.poll_trend_result().await?;
        app.poll_suggestion_result().await?;

        // Poll for events with timeout to allow async operations
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(action) = handle_key_event(key, app.input_mode, app.show_help) {
                        let should_quit = app.handle_action(action).await?;
                        if should_quit {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}
