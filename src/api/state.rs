use tokio::sync::mpsc::UnboundedSender;

use crate::scheduler::{Scheduler, WakeReason};

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Scheduler,
    /// Producer side of the wake channel, for run-now requests.
    pub wake: UnboundedSender<WakeReason>,
}
