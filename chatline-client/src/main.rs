use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use clap::Parser;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::fmt::MakeWriter;

use chatline_client::{
    config::{SavedClientConfig, load_saved_config, save_saved_config, validate_saved_config},
    runtime::{ClientCommand, UiEvent, run_client},
    session::EntryKind,
};

#[derive(Parser, Debug, Clone)]
#[command(name = "chatline")]
struct ClientArgs {
    #[arg(long, default_value = "ws://127.0.0.1:8000")]
    server_url: String,

    /// Username to connect as. When set, the resulting config is saved and
    /// reused on the next run.
    #[arg(long)]
    username: Option<String>,

    /// Append logs to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Clone)]
struct FileMakeWriter {
    file: Arc<Mutex<File>>,
}

struct FileWriterGuard {
    file: Arc<Mutex<File>>,
}

impl Write for FileWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut locked = self
            .file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        locked.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut locked = self
            .file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        locked.flush()
    }
}

impl<'a> MakeWriter<'a> for FileMakeWriter {
    type Writer = FileWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        FileWriterGuard {
            file: Arc::clone(&self.file),
        }
    }
}

fn init_logging(log_file: Option<&Path>) {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();

    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .init();
        return;
    };

    let file = match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("failed to open log file {}: {err}", path.display());
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(io::stderr)
                .init();
            return;
        }
    };

    let make_writer = FileMakeWriter {
        file: Arc::new(Mutex::new(file)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(make_writer)
        .init();
}

fn resolve_config(args: &ClientArgs) -> Result<SavedClientConfig, String> {
    if let Some(username) = args.username.as_deref() {
        let cfg = SavedClientConfig {
            server_url: args.server_url.clone(),
            username: username.to_owned(),
        };
        validate_saved_config(&cfg).map_err(|err| err.to_string())?;
        if let Err(err) = save_saved_config(&cfg) {
            warn!("failed to save config: {err}");
        }
        return Ok(cfg);
    }

    match load_saved_config() {
        Ok(Some(cfg)) => Ok(cfg),
        Ok(None) => Err("no saved config found; pass --username to get started".to_owned()),
        Err(err) => Err(format!("saved config is unusable: {err}")),
    }
}

#[tokio::main]
async fn main() {
    let args = ClientArgs::parse();
    init_logging(args.log_file.as_deref());

    let cfg = match resolve_config(&args) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("config resolution failed: {err}");
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    info!(server_url = %cfg.server_url, username = %cfg.username, "starting");

    let (command_tx, command_rx) = mpsc::unbounded_channel::<ClientCommand>();
    let (ui_event_tx, mut ui_event_rx) = mpsc::unbounded_channel::<UiEvent>();

    let runtime = tokio::spawn(run_client(
        cfg.server_url.clone(),
        cfg.username.clone(),
        command_rx,
        ui_event_tx,
    ));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = ui_event_rx.recv() => {
                match event {
                    Some(event) => render_event(&event),
                    None => break,
                }
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if !dispatch_line(&line, &command_tx) {
                            break;
                        }
                    }
                    Ok(None) | Err(_) => break,
                }
            }
        }
    }

    drop(command_tx);
    let _ = runtime.await;
}

/// Parse one shell line into a command. Returns `false` to quit.
fn dispatch_line(line: &str, command_tx: &mpsc::UnboundedSender<ClientCommand>) -> bool {
    let trimmed = line.trim();
    if trimmed == "/quit" {
        return false;
    }

    if let Some(rest) = trimmed.strip_prefix("/upload") {
        let path = rest.trim();
        let _ = command_tx.send(ClientCommand::UploadFile(PathBuf::from(path)));
        return true;
    }

    if trimmed.is_empty() {
        return true;
    }

    let _ = command_tx.send(ClientCommand::SendText(line.to_owned()));
    true
}

fn render_event(event: &UiEvent) {
    match event {
        UiEvent::Entry(entry) => {
            let prefix = match entry.kind {
                EntryKind::User => "you",
                EntryKind::Bot => "bot",
                EntryKind::Warning => " ! ",
            };
            println!("[{prefix}] {}", entry.text);
        }
        UiEvent::Phase(phase) => {
            info!(phase = ?phase, "connection phase changed");
        }
        UiEvent::Idle { remaining, .. } => {
            debug!(remaining, "idle countdown");
        }
        UiEvent::Rejected(reason) => {
            eprintln!("rejected: {reason}");
        }
    }
}
