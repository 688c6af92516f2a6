use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use tokio::{net::TcpStream, sync::mpsc, time::timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use chatline_core::{encode_payload, file_upload};

use crate::{
    config::channel_url,
    session::{ChatSession, ConnectionPhase, ConversationEntry, UploadRequest},
};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(12);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = futures::stream::SplitSink<WsStream, Message>;

/// Actions from the interactive surface.
#[derive(Debug)]
pub enum ClientCommand {
    SendText(String),
    UploadFile(PathBuf),
}

/// What the interactive surface renders.
#[derive(Debug, Clone)]
pub enum UiEvent {
    Phase(ConnectionPhase),
    Entry(ConversationEntry),
    Idle { remaining: u32, ratio: f32 },
    Rejected(String),
}

#[derive(Debug)]
struct UploadOutcome {
    request: UploadRequest,
    result: Result<Vec<u8>, String>,
}

/// Run one chat session to completion: a single connect attempt, then one
/// event loop over inbound frames, surface commands, and the 1-second idle
/// tick. Returns when the transport closes or the surface hangs up; there is
/// no reconnect.
pub async fn run_client(
    server_url: String,
    username: String,
    mut command_rx: mpsc::UnboundedReceiver<ClientCommand>,
    ui_event_tx: mpsc::UnboundedSender<UiEvent>,
) {
    let mut session = ChatSession::new();
    let mut emitted = 0_usize;
    let mut last_phase = session.phase();

    if let Err(err) = session.connect_requested(&username) {
        let _ = ui_event_tx.send(UiEvent::Rejected(err.to_string()));
        return;
    }
    flush_ui(&session, &mut emitted, &mut last_phase, &ui_event_tx);

    let channel = match channel_url(&server_url, session.username()) {
        Ok(channel) => channel,
        Err(err) => {
            error!(server_url = %server_url, "invalid server url: {err}");
            session.transport_closed();
            flush_ui(&session, &mut emitted, &mut last_phase, &ui_event_tx);
            return;
        }
    };

    info!(channel = %channel, username = %username, "connecting");

    let ws_stream = match timeout(CONNECT_TIMEOUT, connect_async(&channel)).await {
        Ok(Ok((ws_stream, _response))) => ws_stream,
        Ok(Err(err)) => {
            error!(channel = %channel, "connect failed: {err}");
            session.transport_closed();
            flush_ui(&session, &mut emitted, &mut last_phase, &ui_event_tx);
            return;
        }
        Err(_) => {
            error!(channel = %channel, "connect timed out after {:?}", CONNECT_TIMEOUT);
            session.transport_closed();
            flush_ui(&session, &mut emitted, &mut last_phase, &ui_event_tx);
            return;
        }
    };

    info!("connected");
    session.transport_opened();
    flush_ui(&session, &mut emitted, &mut last_phase, &ui_event_tx);

    let (write_half, mut read_half) = ws_stream.split();
    let (frame_tx, frame_rx) = mpsc::unbounded_channel::<String>();
    let send_task = tokio::spawn(network_send_task(write_half, frame_rx));

    let (upload_tx, mut upload_rx) = mpsc::unbounded_channel::<UploadOutcome>();

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.tick().await; // skip first immediate tick

    let mut done = false;
    while !done {
        tokio::select! {
            inbound = read_half.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        session.inbound_frame(text.as_str());
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        session.transport_closed();
                        done = true;
                    }
                    Some(Ok(_)) => {
                        debug!("ignoring non-text frame");
                    }
                    Some(Err(err)) => {
                        warn!("read failed: {err}");
                        session.transport_closed();
                        done = true;
                    }
                }
            }
            command = command_rx.recv() => {
                match command {
                    Some(ClientCommand::SendText(text)) => {
                        handle_send_text(&mut session, &text, &frame_tx, &ui_event_tx);
                    }
                    Some(ClientCommand::UploadFile(path)) => {
                        handle_upload_request(&mut session, path, &upload_tx, &ui_event_tx);
                    }
                    None => {
                        debug!("surface hung up; ending session");
                        done = true;
                    }
                }
            }
            outcome = upload_rx.recv() => {
                if let Some(outcome) = outcome {
                    handle_upload_outcome(&mut session, outcome, &frame_tx, &ui_event_tx);
                }
            }
            _ = ticker.tick() => {
                session.tick();
                let _ = ui_event_tx.send(UiEvent::Idle {
                    remaining: session.seconds_remaining(),
                    ratio: session.idle_ratio(),
                });
            }
        }

        flush_ui(&session, &mut emitted, &mut last_phase, &ui_event_tx);
    }

    send_task.abort();
}

/// Forward freshly appended log entries and phase changes to the surface.
fn flush_ui(
    session: &ChatSession,
    emitted: &mut usize,
    last_phase: &mut ConnectionPhase,
    ui_event_tx: &mpsc::UnboundedSender<UiEvent>,
) {
    if session.phase() != *last_phase {
        *last_phase = session.phase();
        let _ = ui_event_tx.send(UiEvent::Phase(*last_phase));
    }

    for entry in &session.entries()[*emitted..] {
        let _ = ui_event_tx.send(UiEvent::Entry(entry.clone()));
    }
    *emitted = session.entries().len();
}

fn handle_send_text(
    session: &mut ChatSession,
    text: &str,
    frame_tx: &mpsc::UnboundedSender<String>,
    ui_event_tx: &mpsc::UnboundedSender<UiEvent>,
) {
    match session.prepare_user_message(text) {
        Ok(Some(payload)) => match encode_payload(&payload) {
            Ok(frame) => {
                if frame_tx.send(frame).is_err() {
                    warn!("send channel closed; dropping outbound message");
                }
            }
            Err(err) => warn!("failed to encode outbound message: {err}"),
        },
        Ok(None) => {}
        Err(err) => {
            let _ = ui_event_tx.send(UiEvent::Rejected(err.to_string()));
        }
    }
}

fn handle_upload_request(
    session: &mut ChatSession,
    path: PathBuf,
    upload_tx: &mpsc::UnboundedSender<UploadOutcome>,
    ui_event_tx: &mpsc::UnboundedSender<UiEvent>,
) {
    let request = upload_request_for_path(&path);
    if let Err(err) = session.admit_upload(request.as_ref()) {
        let _ = ui_event_tx.send(UiEvent::Rejected(err.to_string()));
        return;
    }
    let request = match request {
        Some(request) => request,
        None => return,
    };

    // Reading and encoding happen off the event loop; frames and commands
    // keep flowing until the outcome arrives.
    let upload_tx = upload_tx.clone();
    tokio::task::spawn_blocking(move || {
        let result = std::fs::read(&path).map_err(|err| err.to_string());
        let _ = upload_tx.send(UploadOutcome { request, result });
    });
}

fn handle_upload_outcome(
    session: &mut ChatSession,
    outcome: UploadOutcome,
    frame_tx: &mpsc::UnboundedSender<String>,
    ui_event_tx: &mpsc::UnboundedSender<UiEvent>,
) {
    let UploadOutcome { request, result } = outcome;
    let bytes = match result {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(filename = %request.filename, "failed to read upload: {err}");
            let _ = ui_event_tx.send(UiEvent::Rejected(format!(
                "failed to read {}: {err}",
                request.filename
            )));
            return;
        }
    };

    let payload = file_upload(&request.filename, &request.content_type, &bytes);
    match encode_payload(&payload) {
        Ok(frame) => {
            if frame_tx.send(frame).is_err() {
                warn!("send channel closed; dropping upload");
                return;
            }
            session.upload_dispatched();
        }
        Err(err) => warn!("failed to encode upload: {err}"),
    }
}

async fn network_send_task(mut ws_write: WsWrite, mut outgoing_rx: mpsc::UnboundedReceiver<String>) {
    while let Some(frame) = outgoing_rx.recv().await {
        if ws_write.send(Message::Text(frame.into())).await.is_err() {
            break;
        }
    }
}

fn declared_content_type(path: &Path) -> String {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let mime = match extension.as_str() {
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        _ => "application/octet-stream",
    };
    mime.to_owned()
}

fn upload_request_for_path(path: &Path) -> Option<UploadRequest> {
    let filename = path.file_name()?.to_str()?.to_owned();
    Some(UploadRequest {
        filename,
        content_type: declared_content_type(path),
    })
}
