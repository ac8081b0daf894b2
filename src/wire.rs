//! Line-delimited JSON protocol.
//!
//! Every request is one JSON object on one line, answered by exactly one
//! reply line. After `listen`, committed events for that property are pushed
//! between replies as `{"event": ...}` lines.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, warn};

use crate::command::{self, interval, Command, CommandError};
use crate::directory::InMemoryDirectory;
use crate::engine::{Engine, EngineError, ReservationRequest};
use crate::limits::{MAX_LINE_LEN, MAX_LISTEN_CHANNELS};
use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability::{self, command_label};

/// Shared state every connection talks to.
pub struct Backend {
    pub engine: Arc<Engine>,
    pub directory: Arc<InMemoryDirectory>,
    pub hub: Arc<NotifyHub>,
    pub password: String,
}

#[derive(Debug)]
pub enum WireError {
    Engine(EngineError),
    Command(CommandError),
    Protocol(&'static str),
    Encode(String),
}

impl WireError {
    pub fn kind(&self) -> &'static str {
        match self {
            WireError::Engine(e) => e.kind(),
            WireError::Command(_) | WireError::Protocol(_) => "protocol",
            WireError::Encode(_) => "internal",
        }
    }
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireError::Engine(e) => write!(f, "{e}"),
            WireError::Command(e) => write!(f, "{e}"),
            WireError::Protocol(msg) => f.write_str(msg),
            WireError::Encode(e) => write!(f, "encode error: {e}"),
        }
    }
}

impl std::error::Error for WireError {}

impl From<EngineError> for WireError {
    fn from(e: EngineError) -> Self {
        WireError::Engine(e)
    }
}

impl From<CommandError> for WireError {
    fn from(e: CommandError) -> Self {
        WireError::Command(e)
    }
}

fn data<T: Serialize>(value: T) -> Result<Value, WireError> {
    serde_json::to_value(value).map_err(|e| WireError::Encode(e.to_string()))
}

fn reply_line(result: Result<Value, WireError>) -> String {
    let reply = match result {
        Ok(data) => json!({ "ok": true, "data": data }),
        Err(e) => json!({
            "ok": false,
            "error": { "kind": e.kind(), "message": e.to_string() },
        }),
    };
    reply.to_string()
}

fn event_line(event: &Event) -> String {
    json!({ "event": event }).to_string()
}

/// Per-connection state. Listen forwarders die with the connection.
#[derive(Default)]
struct Session {
    authenticated: bool,
    listeners: HashMap<PropertyId, JoinHandle<()>>,
}

impl Session {
    /// Stops the forwarder and waits until it has released its receiver,
    /// so a following `prune` sees the subscription gone.
    async fn unlisten(&mut self, property_id: &PropertyId) -> bool {
        match self.listeners.remove(property_id) {
            Some(handle) => {
                stop_forwarder(handle).await;
                true
            }
            None => false,
        }
    }

    async fn close(&mut self) {
        for (_, handle) in self.listeners.drain() {
            stop_forwarder(handle).await;
        }
    }
}

async fn stop_forwarder(handle: JoinHandle<()>) {
    handle.abort();
    // Resolves once the task is gone; cancellation is the expected outcome.
    let _ = handle.await;
}

impl Drop for Session {
    fn drop(&mut self) {
        for (_, handle) in self.listeners.drain() {
            handle.abort();
        }
    }
}

/// Copy a property's broadcast feed into the connection's event queue.
fn spawn_forwarder(
    property_id: PropertyId,
    mut rx: broadcast::Receiver<Event>,
    tx: mpsc::Sender<Event>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("listener on {property_id} lagged, {n} events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

pub async fn process_connection(
    socket: TcpStream,
    backend: Arc<Backend>,
) -> Result<(), LinesCodecError> {
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));
    let mut session = Session::default();

    let result = serve(&backend, &mut session, &mut framed).await;

    session.close().await;
    backend.hub.prune();
    metrics::gauge!(observability::LISTEN_CHANNELS).set(backend.hub.channel_count() as f64);
    result
}

async fn serve(
    backend: &Backend,
    session: &mut Session,
    framed: &mut Framed<TcpStream, LinesCodec>,
) -> Result<(), LinesCodecError> {
    let (event_tx, mut event_rx) = mpsc::channel::<Event>(256);

    loop {
        tokio::select! {
            frame = framed.next() => {
                let line = match frame {
                    Some(Ok(line)) => line,
                    Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                        // The codec skips to the next newline; tell the client and go on.
                        let err = WireError::Command(CommandError::TooLong(MAX_LINE_LEN));
                        framed.send(reply_line(Err(err))).await?;
                        continue;
                    }
                    Some(Err(e)) => return Err(e),
                    None => break,
                };
                if line.trim().is_empty() {
                    continue;
                }
                let reply = handle_line(backend, session, &event_tx, &line).await;
                framed.send(reply).await?;
            }
            Some(event) = event_rx.recv() => {
                framed.send(event_line(&event)).await?;
            }
        }
    }
    Ok(())
}

async fn handle_line(
    backend: &Backend,
    session: &mut Session,
    event_tx: &mpsc::Sender<Event>,
    line: &str,
) -> String {
    let cmd = match command::parse_command(line) {
        Ok(cmd) => cmd,
        Err(e) => {
            metrics::counter!(observability::COMMANDS_TOTAL, "command" => "invalid", "status" => "error")
                .increment(1);
            return reply_line(Err(e.into()));
        }
    };

    let label = command_label(&cmd);
    let started = Instant::now();
    let result = execute(backend, session, event_tx, cmd).await;
    metrics::histogram!(observability::COMMAND_DURATION_SECONDS, "command" => label)
        .record(started.elapsed().as_secs_f64());
    let status = if result.is_ok() { "ok" } else { "error" };
    metrics::counter!(observability::COMMANDS_TOTAL, "command" => label, "status" => status)
        .increment(1);
    if let Err(e) = &result {
        debug!("{label} failed: {e}");
    }
    reply_line(result)
}

async fn execute(
    backend: &Backend,
    session: &mut Session,
    event_tx: &mpsc::Sender<Event>,
    cmd: Command,
) -> Result<Value, WireError> {
    let engine = &backend.engine;
    match cmd {
        Command::Auth { password } => {
            if password != backend.password {
                metrics::counter!(observability::AUTH_FAILURES_TOTAL).increment(1);
                return Err(WireError::Protocol("authentication failed"));
            }
            session.authenticated = true;
            data(json!({ "server": "rentcal", "version": env!("CARGO_PKG_VERSION") }))
        }
        _ if !session.authenticated => Err(WireError::Protocol("authenticate first")),

        Command::CheckAvailability {
            property_id,
            start,
            end,
            exclude,
            booking,
        } => {
            let window = interval(start, end);
            if booking {
                data(engine.check_booking_availability(property_id, window).await?)
            } else {
                data(engine.check_availability(property_id, window, exclude).await)
            }
        }
        Command::UnavailableDays {
            property_id,
            start,
            end,
        } => data(engine.unavailable_days(property_id, interval(start, end)).await?),

        Command::CreateReservation {
            property_id,
            start,
            end,
            contact,
            user_id,
        } => {
            let request = ReservationRequest {
                property_id,
                start,
                end,
                contact,
            };
            data(engine.create_reservation(request, user_id).await?)
        }
        Command::SetReservationStatus { id, status } => {
            data(engine.set_reservation_status(id, status).await?)
        }
        Command::RescheduleReservation { id, start, end } => {
            data(engine.reschedule_reservation(id, interval(start, end)).await?)
        }
        Command::GetReservation { id } => data(engine.get_reservation(id).await?),
        Command::ListReservations {
            status,
            property_id,
            user_id,
        } => {
            let filter = ReservationFilter {
                status,
                property_id,
                user_id,
            };
            data(engine.list_reservations(&filter).await)
        }
        Command::ListPropertyReservations { property_id } => {
            data(engine.list_property_reservations(property_id).await)
        }
        Command::ListUserReservations { user_id } => {
            data(engine.list_user_reservations(user_id).await)
        }

        Command::CreateBlockedRange {
            property_id,
            start,
            end,
            reason,
        } => data(
            engine
                .create_blocked_range(property_id, interval(start, end), reason)
                .await?,
        ),
        Command::UpdateBlockedRange {
            id,
            start,
            end,
            reason,
        } => {
            let patch = BlockedRangePatch { start, end, reason };
            data(engine.update_blocked_range(id, patch).await?)
        }
        Command::DeleteBlockedRange { id } => data(engine.delete_blocked_range(id).await?),
        Command::ListBlockedRanges { property_id } => {
            data(engine.list_blocked_ranges(property_id).await)
        }
        Command::ListBlockedInRange {
            property_id,
            start,
            end,
        } => data(
            engine
                .list_blocked_in_range(property_id, interval(start, end))
                .await?,
        ),
        Command::IsBlocked {
            property_id,
            start,
            end,
        } => data(engine.is_blocked(property_id, interval(start, end)).await?),

        Command::PutProperty { property } => {
            backend.directory.put_property(property.clone());
            data(property)
        }
        Command::PutUser { user } => {
            backend.directory.put_user(user.clone());
            data(user)
        }

        Command::Listen { property_id } => {
            if !session.listeners.contains_key(&property_id) {
                if session.listeners.len() >= MAX_LISTEN_CHANNELS {
                    return Err(EngineError::LimitExceeded("too many listen channels").into());
                }
                let rx = backend.hub.subscribe(property_id);
                let handle = spawn_forwarder(property_id, rx, event_tx.clone());
                session.listeners.insert(property_id, handle);
                metrics::gauge!(observability::LISTEN_CHANNELS)
                    .set(backend.hub.channel_count() as f64);
            }
            data(json!({ "listening": property_id }))
        }
        Command::Unlisten { property_id } => {
            let was_listening = session.unlisten(&property_id).await;
            backend.hub.prune();
            metrics::gauge!(observability::LISTEN_CHANNELS)
                .set(backend.hub.channel_count() as f64);
            data(json!({ "unlistened": was_listening }))
        }
        Command::UnlistenAll => {
            let ids: Vec<PropertyId> = session.listeners.keys().copied().collect();
            for id in &ids {
                session.unlisten(id).await;
            }
            backend.hub.prune();
            metrics::gauge!(observability::LISTEN_CHANNELS)
                .set(backend.hub.channel_count() as f64);
            data(json!({ "unlistened": ids.len() }))
        }
        Command::Compact => {
            engine.compact_journal().await?;
            data(Value::Null)
        }
    }
}
