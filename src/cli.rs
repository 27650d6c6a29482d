//! Command-line front end: one chat turn or one API request per invocation.

use crate::client::{ApiClient, HttpRequest, Method, RetryOptions};
use crate::config::Config;
use crate::stream::{SessionHandler, SessionOutput, SessionState, ToolCall, ToolStatus};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::{self, Read, Write};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

/// Exit code for a turn interrupted with Ctrl-C.
const EXIT_INTERRUPTED: u8 = 130;

/// Talk to the kitchen assistant from the terminal
#[derive(Parser, Debug)]
#[command(name = "sous", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(short = 'o', long, default_value = "text", value_enum, global = true)]
    pub output_format: OutputFormat,

    /// Quiet mode (response only, no progress)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Backend URL (overrides config and SOUS_BASE_URL)
    #[arg(long, global = true)]
    pub base_url: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask the assistant something and stream the answer
    Chat(ChatArgs),
    /// GET a resource
    Get(RequestArgs),
    /// POST a JSON body
    Post(BodyArgs),
    /// PUT a JSON body
    Put(BodyArgs),
    /// DELETE a resource
    Delete(RequestArgs),
    /// Show configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Show config file path
    Path,
}

#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// The message to send (use "-" to read from stdin)
    #[arg(required = true)]
    pub prompt: String,
}

#[derive(Parser, Debug)]
pub struct RequestArgs {
    /// Path relative to the backend URL, e.g. /api/recipes
    pub path: String,

    /// Send once, without retrying
    #[arg(long)]
    pub no_retry: bool,
}

#[derive(Parser, Debug)]
pub struct BodyArgs {
    #[command(flatten)]
    pub request: RequestArgs,

    /// JSON body (use "-" to read from stdin)
    pub body: String,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    StreamJson,
}

/// JSON output structure for json/stream-json modes
#[derive(Serialize)]
#[serde(tag = "type")]
enum JsonEvent<'a> {
    #[serde(rename = "thinking")]
    Thinking { status: &'a str },
    #[serde(rename = "token")]
    Token { text: &'a str },
    #[serde(rename = "message")]
    Message { content: &'a str },
    #[serde(rename = "tool_call")]
    ToolCall { call: &'a ToolCall },
    #[serde(rename = "done")]
    Done {
        state: SessionState,
        response: &'a str,
    },
    #[serde(rename = "error")]
    Error { message: &'a str },
}

/// Writes session callbacks to stdout/stderr as they happen.
struct TerminalHandler {
    format: OutputFormat,
    quiet: bool,
}

impl TerminalHandler {
    fn emit(&self, event: &JsonEvent<'_>) {
        if self.format == OutputFormat::StreamJson
            && let Ok(line) = serde_json::to_string(event)
        {
            println!("{line}");
        }
    }

    fn progress(&self, line: &str) {
        if self.format == OutputFormat::Text && !self.quiet {
            eprintln!("{line}");
        }
    }
}

impl SessionHandler for TerminalHandler {
    fn on_thinking(&mut self, status: &str) {
        self.emit(&JsonEvent::Thinking { status });
        self.progress(&format!("… {status}"));
    }

    fn on_tool_call(&mut self, call: &ToolCall) {
        self.emit(&JsonEvent::ToolCall { call });
        let marker = match call.status {
            ToolStatus::Running => "→",
            ToolStatus::Completed => "✓",
            ToolStatus::Error => "✗",
        };
        self.progress(&format!("{marker} {} ({})", call.name, call.id));
    }

    fn on_token(&mut self, token: &str) {
        self.emit(&JsonEvent::Token { text: token });
        if self.format == OutputFormat::Text {
            print!("{token}");
            let _ = io::stdout().flush();
        }
    }

    fn on_message(&mut self, content: &str) {
        self.emit(&JsonEvent::Message { content });
    }

    fn on_complete(&mut self, output: &SessionOutput) {
        self.emit(&JsonEvent::Done {
            state: SessionState::Completed,
            response: &output.content,
        });
        if self.format == OutputFormat::Text {
            println!();
        }
    }

    fn on_error(&mut self, message: &str) {
        self.emit(&JsonEvent::Error { message });
        if self.format == OutputFormat::Text {
            eprintln!("Error: {message}");
        }
    }
}

/// Entry point after argument parsing and logging setup.
pub async fn run(cli: Cli) -> ExitCode {
    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    let mut config = Config::load().context("Failed to load config")?;
    config.apply_overrides(cli.base_url.clone(), None);
    config.validate()?;

    match cli.command {
        Commands::Chat(ref args) => run_chat(&config.client(), args, cli.output_format, cli.quiet).await,
        Commands::Get(ref args) => {
            run_request(&config.client(), Method::Get, args, None, cli.output_format).await
        }
        Commands::Delete(ref args) => {
            run_request(&config.client(), Method::Delete, args, None, cli.output_format).await
        }
        Commands::Post(ref args) => {
            let body = parse_body(&args.body)?;
            run_request(&config.client(), Method::Post, &args.request, Some(body), cli.output_format).await
        }
        Commands::Put(ref args) => {
            let body = parse_body(&args.body)?;
            run_request(&config.client(), Method::Put, &args.request, Some(body), cli.output_format).await
        }
        Commands::Config { ref action } => {
            match action.as_ref().unwrap_or(&ConfigAction::Show) {
                ConfigAction::Path => println!("{}", Config::path().display()),
                ConfigAction::Show => {
                    let mut shown = config.clone();
                    if shown.api_token.is_some() {
                        shown.api_token = Some("[REDACTED]".to_string());
                    }
                    print!("{}", toml::to_string_pretty(&shown)?);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_interrupt(token: &CancellationToken) {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("Interrupt received");
            token.cancel();
        }
    });
}

fn read_arg_or_stdin(value: &str) -> io::Result<String> {
    if value == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer.trim().to_string())
    } else {
        Ok(value.to_string())
    }
}

fn parse_body(value: &str) -> crate::Result<serde_json::Value> {
    let text = read_arg_or_stdin(value)?;
    Ok(serde_json::from_str(&text)?)
}

async fn run_chat(
    client: &ApiClient,
    args: &ChatArgs,
    format: OutputFormat,
    quiet: bool,
) -> Result<ExitCode> {
    let prompt = read_arg_or_stdin(&args.prompt)?;
    if prompt.is_empty() {
        anyhow::bail!("Empty prompt");
    }

    let cancel = CancellationToken::new();
    cancel_on_interrupt(&cancel);

    let handler = TerminalHandler { format, quiet };
    let outcome = client
        .chat(&crate::client::ChatRequest::new(prompt), handler, &cancel)
        .await;

    if format == OutputFormat::Json {
        let event = match &outcome.error {
            Some(message) => JsonEvent::Error { message },
            None => JsonEvent::Done {
                state: outcome.state,
                response: &outcome.output.content,
            },
        };
        println!("{}", serde_json::to_string(&event)?);
    }

    Ok(match outcome.state {
        SessionState::Completed => ExitCode::SUCCESS,
        SessionState::Cancelled => {
            if format == OutputFormat::Text && !quiet {
                eprintln!("\nInterrupted");
            }
            ExitCode::from(EXIT_INTERRUPTED)
        }
        _ => ExitCode::FAILURE,
    })
}

async fn run_request(
    client: &ApiClient,
    method: Method,
    args: &RequestArgs,
    body: Option<serde_json::Value>,
    format: OutputFormat,
) -> Result<ExitCode> {
    let cancel = CancellationToken::new();
    cancel_on_interrupt(&cancel);

    let mut request = HttpRequest::new(method, &args.path);
    if let Some(body) = body {
        request = request.with_body(body);
    }
    let options = if args.no_retry {
        RetryOptions::none()
    } else {
        client.default_options()
    };

    let value = fetch(client, request, &options, &cancel).await?;
    let rendered = match format {
        OutputFormat::Text => serde_json::to_string_pretty(&value)?,
        OutputFormat::Json | OutputFormat::StreamJson => serde_json::to_string(&value)?,
    };
    println!("{rendered}");
    Ok(ExitCode::SUCCESS)
}

async fn fetch(
    client: &ApiClient,
    request: HttpRequest,
    options: &RetryOptions<crate::client::ClientError>,
    cancel: &CancellationToken,
) -> crate::Result<serde_json::Value> {
    Ok(client.send_with(request, options, cancel).await?)
}
