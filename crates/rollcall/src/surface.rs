//! UI-facing side effects of the controllers.

use rollcall_core::RosterEntry;
use tokio::sync::mpsc;

/// One visible update. Each controller writes only its own kinds of event.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    CaptureStatus(String),
    CaptureControls {
        start_enabled: bool,
        stop_enabled: bool,
    },
    /// A first sighting, to be shown at the top of the roster list.
    RosterPrepended(RosterEntry),
    Alert(String),
    TrainControl {
        enabled: bool,
    },
    TrainProgress {
        percent: u8,
    },
    TrainMessage(String),
    ChartRedrawn {
        labels: Vec<String>,
        counts: Vec<u64>,
        first_render: bool,
    },
}

/// Sink for [`UiEvent`]s.
pub trait Surface: Send + Sync {
    fn emit(&self, event: UiEvent);
}

impl Surface for mpsc::UnboundedSender<UiEvent> {
    fn emit(&self, event: UiEvent) {
        if self.send(event).is_err() {
            tracing::trace!("surface receiver gone; event dropped");
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records every emitted event for assertions.
    #[derive(Default)]
    pub(crate) struct Recorder {
        events: Mutex<Vec<UiEvent>>,
    }

    impl Recorder {
        pub(crate) fn events(&self) -> Vec<UiEvent> {
            self.events.lock().unwrap().clone()
        }

        pub(crate) fn alerts(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    UiEvent::Alert(text) => Some(text),
                    _ => None,
                })
                .collect()
        }

        pub(crate) fn roster_prepends(&self) -> Vec<RosterEntry> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    UiEvent::RosterPrepended(entry) => Some(entry),
                    _ => None,
                })
                .collect()
        }
    }

    impl Surface for Recorder {
        fn emit(&self, event: UiEvent) {
            self.events.lock().unwrap().push(event);
        }
    }
}
