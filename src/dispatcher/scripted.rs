use super::request::CommandRequest;
use super::transport::{CommandResponse, Transport, TransportError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::watch;

type Outcome = Result<CommandResponse, TransportError>;

/// In-process transport with scripted outcomes.
///
/// Commands without a scripted outcome succeed with an empty response.
/// `pause` holds every request after it is logged and before it is
/// answered, which lets callers observe the optimistic state.
pub struct ScriptedTransport {
    outcomes: Mutex<HashMap<String, VecDeque<Outcome>>>,
    log: Mutex<Vec<CommandRequest>>,
    paused: watch::Sender<bool>,
    received: watch::Sender<usize>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        let (received, _) = watch::channel(0);
        Self {
            outcomes: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            paused,
            received,
        }
    }

    /// Queue an outcome for the next request of `command`.
    pub fn script(&self, command: &str, outcome: Outcome) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes
                .entry(command.to_string())
                .or_default()
                .push_back(outcome);
        }
    }

    pub fn succeed_with(&self, command: &str, response: CommandResponse) {
        self.script(command, Ok(response));
    }

    pub fn fail_with(&self, command: &str, error: TransportError) {
        self.script(command, Err(error));
    }

    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<CommandRequest> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    pub fn sent_commands(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.command).collect()
    }

    /// Wait until at least `count` requests have arrived.
    pub async fn wait_for_requests(&self, count: usize) {
        let mut rx = self.received.subscribe();
        let _ = rx.wait_for(|received| *received >= count).await;
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &CommandRequest) -> Outcome {
        if let Ok(mut log) = self.log.lock() {
            log.push(request.clone());
        }
        self.received.send_modify(|received| *received += 1);

        let mut paused = self.paused.subscribe();
        paused
            .wait_for(|is_paused| !*is_paused)
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let scripted = match self.outcomes.lock() {
            Ok(mut outcomes) => outcomes
                .get_mut(&request.command)
                .and_then(VecDeque::pop_front),
            Err(_) => None,
        };

        scripted.unwrap_or_else(|| Ok(CommandResponse::ok()))
    }
}
