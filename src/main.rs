use anyhow::{Context, Result};
use dotenvy::dotenv;
use photo_relay::config::Settings;
use photo_relay::workflow::{OperationStatus, Phase, WorkflowController, WorkflowSnapshot};
use regex::Regex;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting secrets from log output
struct RedactionPatterns {
    token_url: Regex,
    token_bare: Regex,
    google_key: Regex,
}

impl RedactionPatterns {
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token_url: Regex::new(r"(/bot)([0-9]+:[A-Za-z0-9_-]+)")?,
            token_bare: Regex::new(r"\b[0-9]{8,10}:[A-Za-z0-9_-]{35}\b")?,
            google_key: Regex::new(r"AIza[0-9A-Za-z_-]{35}")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let output = self.token_url.replace_all(input, "$1[TELEGRAM_TOKEN]");
        let output = self.token_bare.replace_all(&output, "[TELEGRAM_TOKEN]");
        self.google_key
            .replace_all(&output, "[GEMINI_API_KEY]")
            .into_owned()
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        self.inner.write_all(self.patterns.redact(&s).as_bytes())?;
        // Report the original length; the redacted text may differ in size
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: (self.make_inner)(),
            patterns: Arc::clone(&self.patterns),
        }
    }
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter {
        make_inner: io::stderr,
        patterns,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

const HELP: &str = "\
Commands:
  prompt <text>     set the prompt
  image <path>      use an image as edit source
  clear-image       drop the edit source
  token <value>     set the Telegram bot token
  chat <value>      set the Telegram chat id
  generate          generate (or edit) an image
  send              send the image to Telegram
  save <path>       write the generated image to disk
  dismiss           dismiss the status message
  status            show current state
  quit              exit";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let patterns = Arc::new(RedactionPatterns::new().context("invalid redaction pattern")?);
    init_logging(patterns);

    let settings = Settings::new().context("failed to load configuration")?;
    info!(model = %settings.gemini_model, "Configuration loaded");

    let workflow = WorkflowController::from_settings(&settings)
        .await
        .context("failed to initialize workflow")?;

    println!("{HELP}");
    render(&workflow.snapshot().await);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (command, arg) = line.split_once(' ').unwrap_or((line, ""));
        let arg = arg.trim();

        // Failures are already recorded in the status; render shows them
        let result = match command {
            "prompt" => {
                workflow.set_prompt(arg).await;
                Ok(())
            }
            "image" => workflow.load_source_image(Path::new(arg), None).await,
            "clear-image" => workflow.clear_source_image().await,
            "token" => workflow.set_bot_token(arg).await,
            "chat" => workflow.set_chat_id(arg).await,
            "generate" => workflow.on_generate().await,
            "send" => workflow.on_send().await,
            "dismiss" => {
                workflow.dismiss_status().await;
                Ok(())
            }
            "save" => {
                save_artifact(&workflow.snapshot().await, Path::new(arg)).await;
                Ok(())
            }
            "status" => Ok(()),
            "help" => {
                println!("{HELP}");
                Ok(())
            }
            "quit" | "exit" => break,
            other => {
                println!("Unknown command: {other} (try `help`)");
                continue;
            }
        };
        if let Err(e) = result {
            error!(command, error = %e, "Command failed");
        }

        if workflow.take_credentials_reveal().await {
            println!("Telegram credentials are needed: use `token <value>` and `chat <value>`.");
        }
        render(&workflow.snapshot().await);
    }

    Ok(())
}

async fn save_artifact(snapshot: &WorkflowSnapshot, path: &Path) {
    let Some(artifact) = &snapshot.artifact else {
        println!("No generated image to save.");
        return;
    };
    match artifact.decode() {
        Ok((bytes, mime_type)) => match tokio::fs::write(path, &bytes).await {
            Ok(()) => println!("Saved {} bytes ({mime_type}) to {}", bytes.len(), path.display()),
            Err(e) => println!("Failed to save image: {e}"),
        },
        Err(e) => println!("Failed to decode image: {e}"),
    }
}

fn render(snapshot: &WorkflowSnapshot) {
    if let Some(warning) = snapshot.configuration_warning {
        println!("⚠️  {warning}");
    }

    let phase = match snapshot.phase {
        Phase::Idle => "idle",
        Phase::Generating => "generating…",
        Phase::Sending => "sending…",
    };
    let mode = snapshot
        .source
        .as_ref()
        .map_or_else(|| "create".to_string(), |s| format!("edit {}", s.display_name));
    let result = snapshot.artifact.as_ref().map_or("none", |_| "ready");
    let creds = if snapshot.credentials.is_complete() {
        "set"
    } else {
        "missing"
    };

    println!(
        "[{phase}] mode: {mode} | prompt: {:?} | image: {result} | telegram: {creds}",
        snapshot.prompt
    );

    match &snapshot.status {
        Some(OperationStatus::Success(msg)) => println!("✅ {msg}"),
        Some(OperationStatus::Failure(msg)) => println!("❌ {msg}"),
        None => {}
    }
}
