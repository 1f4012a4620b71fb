//! HTTP + WebSocket Server Module
//!
//! This module defines the rover's network front end using the `picoserve`
//! framework. Both transports feed the shared [`COMMAND_BUS`]:
//!
//! - `GET /rover?direction=<d>&speed=<s>` submits a turtle command and echoes
//!   `d,s` (200) or answers `bad_request` (400);
//! - `GET /ws` upgrades to the persistent command socket, which echoes each
//!   accepted text command and answers `nack(<status>)` otherwise;
//! - `GET /health` reports liveness.

use alloc::{format, string::String};

use embassy_net::Stack;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Duration;
use embedded_io_async::Read;
use picoserve::{
    extract::FromRequest,
    io::embedded_io_async as embedded_aio,
    request::{RequestBody, RequestParts},
    response::{
        ws::{Message, ReadMessageError, SocketRx, SocketTx, WebSocketCallback, WebSocketUpgrade},
        Response, StatusCode,
    },
    url_encoded::deserialize_form,
    Router,
};
use serde::Deserialize;

use crate::utils::{
    command::RoverError,
    controllers::{CommandBus, SubmitCommandResult, COMMAND_BUS},
};

/// Body of `GET /health`.
const HEALTH_BODY: &str = "{\"health\":\"ok\"}";

/// The persistent command channel.
pub struct CommandSocket;

/// Reply sent back on the socket for a submitted command.
fn socket_reply(
    raw: &str,
    result: &SubmitCommandResult,
) -> String {
    if result.is_success() {
        String::from(raw)
    } else {
        format!("nack({})", result.status)
    }
}

/// Handles incoming command socket connections.
impl WebSocketCallback for CommandSocket {
    async fn run<Reader, Writer>(
        self,
        mut rx: SocketRx<Reader>,
        mut tx: SocketTx<Writer>,
    ) -> Result<(), Writer::Error>
    where
        Reader: embedded_aio::Read,
        Writer: embedded_aio::Write<Error = Reader::Error>,
    {
        let mut buffer = [0; 1024];

        tx.send_text("Connected").await?;

        let close_reason = loop {
            match rx.next_message(&mut buffer).await {
                Ok(Message::Pong(_)) => continue,
                Ok(Message::Ping(data)) => tx.send_pong(data).await?,
                Ok(Message::Close(reason)) => {
                    tracing::info!(?reason, "command socket closed");
                    break None;
                }
                Ok(Message::Text(data)) => {
                    tracing::info!(command = data, "command socket text");
                    let result = COMMAND_BUS.submit_tank_command(data);
                    if !result.is_success() {
                        tracing::warn!(status = result.status, command = data, "command rejected");
                    }
                    tx.send_text(&socket_reply(data, &result)).await?
                }
                Ok(Message::Binary(data)) => match core::str::from_utf8(data) {
                    Ok(text) => {
                        let result = COMMAND_BUS.submit_tank_command(text);
                        tx.send_binary(socket_reply(text, &result).as_bytes())
                            .await?
                    }
                    Err(error) => {
                        tracing::error!(?error, "binary command is not utf-8");
                        let reply = format!("nack({})", RoverError::BadInput.status());
                        tx.send_binary(reply.as_bytes()).await?
                    }
                },
                Err(error) => {
                    tracing::error!(?error, "websocket error");
                    let code = match error {
                        ReadMessageError::TextIsNotUtf8 => 1007,
                        ReadMessageError::ReservedOpcode(_) => 1003,
                        ReadMessageError::ReadFrameError(_)
                        | ReadMessageError::UnexpectedMessageStart
                        | ReadMessageError::MessageStartsWithContinuation => 1002,
                        ReadMessageError::Io(err) => return Err(err),
                    };
                    break Some((code, "Websocket Error"));
                }
            };
        };

        tx.close(close_reason).await
    }
}

/// Echo body for an accepted `/rover` request.
fn turtle_echo(query: &RoverQuery) -> String {
    format!("{},{}", query.direction, query.speed)
}

/// Handle `GET /rover`: the echo for a 200, or the reason for a 400.
fn rover_request<M: RawMutex, const N: usize>(
    bus: &CommandBus<M, N>,
    query: &RoverQuery,
) -> Result<String, RoverError> {
    let direction = Some(query.direction.as_str()).filter(|d| !d.is_empty());
    let speed = Some(query.speed.as_str()).filter(|s| !s.is_empty());
    bus.submit_turtle_command(direction, speed)?;
    Ok(turtle_echo(query))
}

/// Creates the HTTP server
pub async fn run(
    id: usize,
    port: u16,
    stack: Stack<'static>,
    config: Option<&'static picoserve::Config<Duration>>,
) -> ! {
    let default_config = picoserve::Config::new(picoserve::Timeouts {
        start_read_request: Some(Duration::from_secs(5)),
        persistent_start_read_request: None,
        read_request: Some(Duration::from_secs(1)),
        write: Some(Duration::from_secs(5)),
    });

    let config = config.unwrap_or(&default_config);

    let router = Router::new()
        .route(
            "/health",
            picoserve::routing::get(|| async {
                Response::new(StatusCode::OK, HEALTH_BODY)
                    .with_headers([("Content-Type", "application/json")])
            }),
        )
        // Turtle commands as query parameters
        .route(
            "/rover",
            picoserve::routing::get(|query: RoverQuery| async move {
                match rover_request(&COMMAND_BUS, &query) {
                    Ok(echo) => {
                        tracing::info!(%echo, "rover command queued");
                        Response::new(StatusCode::OK, echo)
                    }
                    Err(error) => {
                        tracing::warn!(?error, ?query, "rover command rejected");
                        Response::new(StatusCode::BAD_REQUEST, String::from("bad_request"))
                    }
                }
            }),
        )
        // Persistent command channel on "/ws"
        .route(
            "/ws",
            picoserve::routing::get(|upgrade: WebSocketUpgrade| async move {
                tracing::info!("New command socket connection");
                upgrade.on_upgrade(CommandSocket).with_protocol("messages")
            }),
        );

    // Print out the IP and port before starting the server.
    if let Some(ip_cfg) = stack.config_v4() {
        tracing::info!("Starting server at {}:{}", ip_cfg.address, port);
    } else {
        tracing::warn!("Starting server on port {port}, but no IPv4 address is assigned yet!");
    }

    let (mut rx_buffer, mut tx_buffer, mut http_buffer) = ([0; 1024], [0; 1024], [0; 4096]);

    picoserve::listen_and_serve_with_state(
        id,
        &router,
        config,
        stack,
        port,
        &mut rx_buffer,
        &mut tx_buffer,
        &mut http_buffer,
        &(),
    )
    .await
}

/// Query of `GET /rover`. Absent parameters stay empty.
#[derive(Debug, Default, Deserialize)]
pub struct RoverQuery {
    #[serde(default)]
    pub direction: String,
    #[serde(default)]
    pub speed: String,
}

impl<'r, S> FromRequest<'r, S> for RoverQuery {
    type Rejection = &'static str; // never produced

    async fn from_request<R: Read>(
        _state: &'r S,
        parts: RequestParts<'r>,
        _body: RequestBody<'r, R>,
    ) -> Result<Self, Self::Rejection> {
        let query = parts
            .query()
            .and_then(|query_str| deserialize_form::<RoverQuery>(query_str).ok())
            .unwrap_or_default();
        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::command::RoverCommand;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    type TestBus = CommandBus<NoopRawMutex, 2>;

    fn query(direction: &str, speed: &str) -> RoverQuery {
        RoverQuery {
            direction: String::from(direction),
            speed: String::from(speed),
        }
    }

    #[test]
    fn socket_echoes_accepted_commands() {
        let result = SubmitCommandResult {
            status: 0,
            id: Some(3),
            command: RoverCommand::Halt,
        };
        assert_eq!(socket_reply("cmd(3,halt())", &result), "cmd(3,halt())");
    }

    #[test]
    fn socket_nacks_with_status() {
        let result = SubmitCommandResult {
            status: RoverError::QueueFull.status(),
            id: None,
            command: RoverCommand::Noop,
        };
        assert_eq!(socket_reply("forward,10", &result), "nack(-3)");
    }

    #[test]
    fn turtle_echo_joins_parameters() {
        assert_eq!(turtle_echo(&query("left", "80")), "left,80");
    }

    #[test]
    fn rover_accepts_and_echoes() {
        let bus = TestBus::new();
        assert_eq!(
            rover_request(&bus, &query("forward", "120")),
            Ok(String::from("forward,120"))
        );
        assert_eq!(bus.queue().len(), 1);
    }

    #[test]
    fn rover_rejects_missing_or_invalid_parameters() {
        let bus = TestBus::new();
        for (direction, speed) in [("", "10"), ("forward", ""), ("forward", "999"), ("up", "10")] {
            assert_eq!(
                rover_request(&bus, &query(direction, speed)),
                Err(RoverError::BadInput),
                "direction={direction} speed={speed}"
            );
        }
        assert!(bus.queue().is_empty());
    }

    #[test]
    fn rover_rejects_when_queue_is_full() {
        let bus = TestBus::new();
        rover_request(&bus, &query("left", "1")).unwrap();
        rover_request(&bus, &query("left", "2")).unwrap();
        assert_eq!(
            rover_request(&bus, &query("right", "3")),
            Err(RoverError::QueueFull)
        );
        assert_eq!(bus.queue().len(), 2);
    }

    #[test]
    fn rover_stop_needs_no_speed() {
        let bus = TestBus::new();
        rover_request(&bus, &query("forward", "50")).unwrap();
        assert_eq!(rover_request(&bus, &query("stop", "")), Ok(String::from("stop,")));
        assert!(bus.queue().is_empty());
        assert!(bus.take_halt());
    }

    #[test]
    fn health_body_is_compact_json() {
        assert_eq!(HEALTH_BODY, r#"{"health":"ok"}"#);
    }
}
