use tokio::sync::broadcast;

/// Tells running node tasks to stop. Clones are connected: shutting down
/// any of them reaches all of them, including clones made before the call.
#[derive(Debug)]
pub struct Shutdown {
    notify: broadcast::Sender<ExitStatus>,
    /// Subscribed on creation so a shutdown sent before anyone waits is not
    /// missed
    receiver: broadcast::Receiver<ExitStatus>,
    /// The status received so far, so waiting again returns immediately
    status: Option<ExitStatus>,
}

impl Shutdown {
    /// Creates a new active shutdown.
    pub fn new() -> Self {
        let (notify, receiver) = broadcast::channel(1);
        Self {
            notify,
            receiver,
            status: None,
        }
    }

    /// Sends `ExitStatus::Completed` to every connected `Shutdown`.
    pub fn shut_down(&self) {
        self.shut_down_with_status(ExitStatus::Completed)
    }

    /// Sends `status` to every connected `Shutdown`.
    pub fn shut_down_with_status(&self, status: ExitStatus) {
        if let Err(e) = self.notify.send(status) {
            tracing::error!("Failed to initiate shutdown: {}", e);
        }
    }

    /// Waits to receive a shutdown status. Safe to cancel, which makes it
    /// usable as a branch of `tokio::select!`.
    pub async fn wait_for_shutdown(&mut self) -> ExitStatus {
        use broadcast::error::RecvError;

        if let Some(status) = self.status {
            return status;
        }
        loop {
            match self.receiver.recv().await {
                Ok(status) => {
                    self.status = Some(status);
                    return status;
                }
                // The sender lives in `self`, so the channel never closes
                Err(RecvError::Closed) => return ExitStatus::Completed,
                Err(RecvError::Lagged(_)) => (),
            }
        }
    }
}

impl Clone for Shutdown {
    fn clone(&self) -> Self {
        Self {
            notify: self.notify.clone(),
            receiver: self.receiver.resubscribe(),
            status: self.status,
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a simulation ended.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ExitStatus {
    /// Every scheduled event was processed
    Completed,
    /// The simulation reached its time limit with events left
    TimedOut,
    /// Stopped from outside, for instance by Ctrl-C
    Interrupted,
}
