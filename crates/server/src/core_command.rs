//! Commands sent to the core actor from the transport, the transcript
//! watcher, permission waiters and view connections.

use relaydeck_protocol::{UserDecision, ViewCommand};
use tokio::sync::oneshot;

use crate::router::Input;

pub enum CoreCommand {
    /// Run an input through the router
    Process { input: Input },

    /// Human decision on a pending permission request
    DecidePermission {
        request_id: String,
        decision: UserDecision,
    },

    /// Abort every pending permission request and stop. Replies with the
    /// number of requests aborted.
    Shutdown { reply: oneshot::Sender<usize> },
}

impl CoreCommand {
    pub fn process(input: Input) -> Self {
        CoreCommand::Process { input }
    }

    /// Map a view command onto the core. `Subscribe` is answered by the
    /// connection itself and has no core counterpart.
    pub fn from_view(command: ViewCommand) -> Option<Self> {
        let input = match command {
            ViewCommand::Subscribe => return None,
            ViewCommand::DecidePermission {
                request_id,
                decision,
            } => {
                return Some(CoreCommand::DecidePermission {
                    request_id,
                    decision,
                })
            }
            ViewCommand::NewConversation => Input::NewConversation,
            ViewCommand::SelectSession { session_id } => Input::SelectSession { session_id },
            ViewCommand::SubmitPrompt {
                prompt,
                attachments,
            } => Input::SubmitPrompt {
                prompt,
                attachments,
            },
            ViewCommand::LoadOlder { session_id } => Input::LoadOlder { session_id },
            ViewCommand::AbortSession { session_id } => Input::AbortSession { session_id },
        };
        Some(CoreCommand::process(input))
    }
}
