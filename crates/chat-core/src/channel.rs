use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::trace;

use crate::types::{ChatCommand, ChatEvent};

/// Broadcast event stream handed to presentation sinks.
pub type EventStream = broadcast::Receiver<ChatEvent>;

#[derive(Debug, Error)]
pub enum ChatChannelError {
    /// The runtime is gone, or this copy was made without a command side.
    #[error("command channel is closed")]
    CommandChannelClosed,
}

/// Command/event channel pair shared by the runtime and its front ends.
///
/// Front ends hold copies with a command side. The runtime holds an
/// [`event_side`](Self::event_side) copy so that dropping every front-end
/// copy closes the command channel and stops it.
#[derive(Clone, Debug)]
pub struct ChatChannels {
    command_tx: Option<mpsc::Sender<ChatCommand>>,
    event_tx: broadcast::Sender<ChatEvent>,
}

impl ChatChannels {
    /// Create a new channel set and return it with the command receiver.
    pub fn new(command_buffer: usize, event_buffer: usize) -> (Self, mpsc::Receiver<ChatCommand>) {
        let (command_tx, command_rx) = mpsc::channel(command_buffer.max(1));
        let (event_tx, _) = broadcast::channel(event_buffer.max(1));

        (
            Self {
                command_tx: Some(command_tx),
                event_tx,
            },
            command_rx,
        )
    }

    /// Copy that shares the event fan-out but cannot send commands.
    pub fn event_side(&self) -> Self {
        Self {
            command_tx: None,
            event_tx: self.event_tx.clone(),
        }
    }

    pub fn subscribe(&self) -> EventStream {
        self.event_tx.subscribe()
    }

    /// Queue one command, waiting while the buffer is full.
    pub async fn send_command(&self, command: ChatCommand) -> Result<(), ChatChannelError> {
        let Some(command_tx) = &self.command_tx else {
            return Err(ChatChannelError::CommandChannelClosed);
        };
        command_tx
            .send(command)
            .await
            .map_err(|_| ChatChannelError::CommandChannelClosed)
    }

    /// Fan one event out to every subscriber. Nobody listening is not an error.
    pub fn emit(&self, event: ChatEvent) {
        if let Err(broadcast::error::SendError(event)) = self.event_tx.send(event) {
            trace!(?event, "no event subscribers");
        }
    }
}
