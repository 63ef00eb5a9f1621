use std::{sync::Arc, time::Duration};

use chat_core::{CLOSE_ABNORMAL, CLOSE_POLICY_VIOLATION, ChatErrorCategory};
use tokio::{sync::mpsc, task::JoinHandle, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::transport::{Connector, TransportFrame};

/// Upper bound on waiting for a connection task to finish its close.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifecycle signal from one connection task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConnectionSignal {
    Opened,
    Message(String),
    Error(String),
    Closed { code: u16, reason: String },
}

/// Everything the runtime's event loop wakes up for besides commands.
#[derive(Debug)]
pub(crate) enum RuntimeSignal {
    Connection { id: Uuid, signal: ConnectionSignal },
    ReconnectDue { id: Uuid },
}

/// Handle to the task that owns one live transport.
#[derive(Debug)]
pub(crate) struct RunningConnection {
    pub(crate) id: Uuid,
    outbound: mpsc::UnboundedSender<String>,
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl RunningConnection {
    /// Queue one frame for the writer. Returns `false` once the task is gone.
    pub(crate) fn write(&self, payload: String) -> bool {
        self.outbound.send(payload).is_ok()
    }

    /// Cancel the task and wait for the transport to close.
    ///
    /// Close failures are not escalated; the task is aborted after a timeout.
    pub(crate) async fn shutdown(self) {
        self.stop.cancel();
        let mut task = self.task;
        match timeout(CLOSE_TIMEOUT, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!(connection_id = %self.id, %err, "connection task ended abnormally"),
            Err(_) => {
                warn!(connection_id = %self.id, "connection close timed out; aborting task");
                task.abort();
            }
        }
    }
}

/// Spawn the task that opens `url` and pumps frames both ways.
pub(crate) fn spawn_connection(
    connector: Arc<dyn Connector>,
    url: Url,
    id: Uuid,
    signals: mpsc::UnboundedSender<RuntimeSignal>,
) -> RunningConnection {
    let stop = CancellationToken::new();
    let stop_child = stop.child_token();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();

    let emit = move |signal: ConnectionSignal| {
        let _ = signals.send(RuntimeSignal::Connection { id, signal });
    };

    let task = tokio::spawn(async move {
        let opened = tokio::select! {
            _ = stop_child.cancelled() => return,
            opened = connector.open(&url) => opened,
        };

        let mut transport = match opened {
            Ok(transport) => transport,
            Err(err) => {
                let code = if err.category == ChatErrorCategory::Auth {
                    CLOSE_POLICY_VIOLATION
                } else {
                    emit(ConnectionSignal::Error(err.message.clone()));
                    CLOSE_ABNORMAL
                };
                emit(ConnectionSignal::Closed {
                    code,
                    reason: err.message,
                });
                return;
            }
        };

        emit(ConnectionSignal::Opened);

        loop {
            tokio::select! {
                _ = stop_child.cancelled() => {
                    if let Err(err) = transport.close().await {
                        debug!(connection_id = %id, error = %err, "best-effort close failed");
                    }
                    break;
                }
                Some(payload) = outbound_rx.recv() => {
                    if let Err(err) = transport.send_text(payload).await {
                        warn!(connection_id = %id, error = %err, "failed to write frame");
                    }
                }
                frame = transport.next_frame() => match frame {
                    TransportFrame::Text(text) => emit(ConnectionSignal::Message(text)),
                    TransportFrame::Error(message) => {
                        emit(ConnectionSignal::Error(message.clone()));
                        emit(ConnectionSignal::Closed {
                            code: CLOSE_ABNORMAL,
                            reason: message,
                        });
                        break;
                    }
                    TransportFrame::Closed { code, reason } => {
                        emit(ConnectionSignal::Closed { code, reason });
                        break;
                    }
                },
            }
        }
    });

    RunningConnection {
        id,
        outbound,
        stop,
        task,
    }
}
