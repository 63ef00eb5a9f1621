use std::{sync::Arc, time::Duration};

use chat_core::{
    ChatChannelError, ChatChannels, ChatCommand, ChatError, ChatEvent, ClosePolicy,
    ConnectionAction, ConnectionStateMachine, Credential, EventStream, RetryPolicy, Transition,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;
use uuid::Uuid;

use crate::{
    connection::{ConnectionSignal, RunningConnection, RuntimeSignal, spawn_connection},
    transport::{Connector, WsConnector, endpoint_with_token, redacted},
};

/// Gateway endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8080/ws";

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

/// Settings for one runtime instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Gateway URL; the token is appended per connection.
    pub endpoint: Url,
    pub retry: RetryPolicy,
    pub close_policy: ClosePolicy,
}

impl RuntimeConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            retry: RetryPolicy::default(),
            close_policy: ClosePolicy::default(),
        }
    }
}

/// Cloneable front-end handle. Dropping every handle tears the runtime down.
#[derive(Clone, Debug)]
pub struct ChatRuntimeHandle {
    channels: ChatChannels,
}

impl ChatRuntimeHandle {
    pub async fn send(&self, command: ChatCommand) -> Result<(), ChatChannelError> {
        self.channels.send_command(command).await
    }

    /// Start a new campaign. Outcomes arrive as events.
    pub async fn connect(
        &self,
        display_name: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<(), ChatChannelError> {
        self.send(ChatCommand::Connect {
            display_name: display_name.into(),
            token: token.into(),
        })
        .await
    }

    pub async fn send_message(&self, text: impl Into<String>) -> Result<(), ChatChannelError> {
        self.send(ChatCommand::SendMessage { text: text.into() })
            .await
    }

    pub async fn shutdown(&self) -> Result<(), ChatChannelError> {
        self.send(ChatCommand::Shutdown).await
    }

    pub fn subscribe(&self) -> EventStream {
        self.channels.subscribe()
    }
}

/// Spawn a runtime that talks WebSocket to `config.endpoint`.
pub fn spawn_runtime(config: RuntimeConfig) -> (ChatRuntimeHandle, JoinHandle<()>) {
    spawn_runtime_with_connector(config, Arc::new(WsConnector))
}

/// Spawn a runtime that opens transports through `connector`.
pub fn spawn_runtime_with_connector(
    config: RuntimeConfig,
    connector: Arc<dyn Connector>,
) -> (ChatRuntimeHandle, JoinHandle<()>) {
    let (channels, command_rx) = ChatChannels::new(COMMAND_BUFFER, EVENT_BUFFER);
    let runtime = ChatRuntime::new(config, connector, channels.event_side(), command_rx);
    let task = tokio::spawn(async move {
        runtime.run().await;
    });

    (ChatRuntimeHandle { channels }, task)
}

#[derive(Debug)]
struct ReconnectTimer {
    id: Uuid,
    stop: CancellationToken,
    task: JoinHandle<()>,
}

/// Single event loop owning the state machine, the live connection and the
/// reconnect timer. Commands, transport signals and timer expiries are
/// handled one at a time, each to completion.
struct ChatRuntime {
    channels: ChatChannels,
    command_rx: mpsc::Receiver<ChatCommand>,
    signal_tx: mpsc::UnboundedSender<RuntimeSignal>,
    signal_rx: mpsc::UnboundedReceiver<RuntimeSignal>,
    state_machine: ConnectionStateMachine,
    connector: Arc<dyn Connector>,
    endpoint: Url,
    connection: Option<RunningConnection>,
    reconnect: Option<ReconnectTimer>,
}

impl ChatRuntime {
    fn new(
        config: RuntimeConfig,
        connector: Arc<dyn Connector>,
        channels: ChatChannels,
        command_rx: mpsc::Receiver<ChatCommand>,
    ) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        Self {
            channels,
            command_rx,
            signal_tx,
            signal_rx,
            state_machine: ConnectionStateMachine::new(config.retry, config.close_policy),
            connector,
            endpoint: config.endpoint,
            connection: None,
            reconnect: None,
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.command_rx.recv() => {
                    let Some(command) = command else {
                        debug!("all runtime handles dropped");
                        break;
                    };
                    let stop = command == ChatCommand::Shutdown;
                    if let Err(err) = self.handle_command(command).await {
                        debug!(code = %err.code, "command rejected: {}", err.message);
                        self.channels
                            .emit(ChatEvent::from_error(&err, err.is_terminal()));
                    }
                    if stop {
                        break;
                    }
                }
                Some(signal) = self.signal_rx.recv() => self.handle_signal(signal).await,
            }
        }

        self.teardown().await;
        info!("chat runtime stopped");
    }

    async fn handle_command(&mut self, command: ChatCommand) -> Result<(), ChatError> {
        trace!(?command, "handling command");
        match command {
            ChatCommand::Connect {
                display_name,
                token,
            } => {
                let credential = Credential::new(&display_name, &token)?;
                let transition = self.state_machine.connect(credential)?;
                self.apply(transition).await;
            }
            ChatCommand::SendMessage { text } => {
                let transition = self.state_machine.send_message(&text)?;
                self.apply(transition).await;
            }
            ChatCommand::Shutdown => self.teardown().await,
        }
        Ok(())
    }

    async fn handle_signal(&mut self, signal: RuntimeSignal) {
        match signal {
            RuntimeSignal::Connection { id, signal } => {
                if self.connection.as_ref().map(|running| running.id) != Some(id) {
                    trace!(connection_id = %id, ?signal, "dropping signal from superseded connection");
                    return;
                }
                self.handle_connection_signal(signal).await;
            }
            RuntimeSignal::ReconnectDue { id } => {
                if self.reconnect.as_ref().map(|timer| timer.id) != Some(id) {
                    trace!(timer_id = %id, "dropping fire from cancelled reconnect timer");
                    return;
                }
                self.reconnect = None;
                match self.state_machine.on_reconnect_timer() {
                    Ok(transition) => self.apply(transition).await,
                    Err(err) => warn!(code = %err.code, "reconnect timer fired: {}", err.message),
                }
            }
        }
    }

    async fn handle_connection_signal(&mut self, signal: ConnectionSignal) {
        match signal {
            ConnectionSignal::Opened => match self.state_machine.on_opened() {
                Ok(transition) => self.apply(transition).await,
                Err(err) => warn!(code = %err.code, "unexpected open: {}", err.message),
            },
            ConnectionSignal::Message(raw) => {
                if let Some(event) = self.state_machine.on_message(&raw) {
                    self.channels.emit(event);
                }
            }
            ConnectionSignal::Error(message) => self.state_machine.on_error(&message),
            ConnectionSignal::Closed { code, reason } => {
                self.close_connection().await;
                let transition = self.state_machine.on_closed(code, &reason);
                self.apply(transition).await;
            }
        }
    }

    async fn apply(&mut self, transition: Transition) {
        for event in transition.events {
            self.channels.emit(event);
        }
        for action in transition.actions {
            match action {
                ConnectionAction::Open { credential } => self.open_connection(&credential).await,
                ConnectionAction::ScheduleReconnect { attempt, delay } => {
                    self.schedule_reconnect(attempt, delay)
                }
                ConnectionAction::CancelReconnect => self.cancel_reconnect(),
                ConnectionAction::Write { payload } => self.write(payload),
                ConnectionAction::Close => self.close_connection().await,
            }
        }
    }

    async fn open_connection(&mut self, credential: &Credential) {
        self.close_connection().await;

        let url = endpoint_with_token(&self.endpoint, credential.token());
        let id = Uuid::new_v4();
        info!(connection_id = %id, endpoint = %redacted(&url), "opening transport");
        self.connection = Some(spawn_connection(
            self.connector.clone(),
            url,
            id,
            self.signal_tx.clone(),
        ));
    }

    async fn close_connection(&mut self) {
        if let Some(running) = self.connection.take() {
            debug!(connection_id = %running.id, "closing transport");
            running.shutdown().await;
        }
    }

    fn write(&self, payload: String) {
        let Some(running) = &self.connection else {
            warn!("no live transport; dropping outgoing frame");
            return;
        };
        if !running.write(payload) {
            warn!(connection_id = %running.id, "transport writer is gone; dropping outgoing frame");
        }
    }

    fn schedule_reconnect(&mut self, attempt: u32, delay: Duration) {
        self.cancel_reconnect();

        let id = Uuid::new_v4();
        let stop = CancellationToken::new();
        let stop_child = stop.child_token();
        let signal_tx = self.signal_tx.clone();
        debug!(timer_id = %id, attempt, delay_ms = delay.as_millis() as u64, "arming reconnect timer");

        let task = tokio::spawn(async move {
            tokio::select! {
                _ = stop_child.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = signal_tx.send(RuntimeSignal::ReconnectDue { id });
                }
            }
        });
        self.reconnect = Some(ReconnectTimer { id, stop, task });
    }

    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect.take() {
            debug!(timer_id = %timer.id, "cancelling reconnect timer");
            timer.stop.cancel();
            timer.task.abort();
        }
    }

    async fn teardown(&mut self) {
        let transition = self.state_machine.shutdown();
        self.apply(transition).await;
        self.cancel_reconnect();
        self.close_connection().await;
    }
}
