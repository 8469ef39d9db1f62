//! Connectivity state source
//!
//! On a device runtime connectivity follows the native connection type, on a
//! browser-like runtime it follows the host's online flag. The monitor only
//! reports state; it never retries anything.

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

/// Where the access layer is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    /// Mobile device with native connection-type signals
    Device,
    /// Host runtime where the transport handles offline itself
    #[default]
    Browser,
}

/// Native connection type reported by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Unknown,
    Ethernet,
    Wifi,
    Cellular,
    None,
}

/// Current connectivity as seen by the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connectivity {
    pub online: bool,
    pub connection_type: Option<ConnectionType>,
}

/// Online/offline transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    Connected(Option<ConnectionType>),
    Disconnected,
}

/// Process-wide connectivity monitor.
///
/// Cheap to clone; all clones observe and mutate the same state.
#[derive(Clone)]
pub struct NetworkMonitor {
    runtime: Runtime,
    state: Arc<watch::Sender<Connectivity>>,
    events: broadcast::Sender<NetworkEvent>,
}

impl NetworkMonitor {
    /// Create a monitor that starts online.
    pub fn new(runtime: Runtime) -> Self {
        let initial = Connectivity {
            online: true,
            connection_type: match runtime {
                Runtime::Device => Some(ConnectionType::Unknown),
                Runtime::Browser => None,
            },
        };
        let (state, _) = watch::channel(initial);
        let (events, _) = broadcast::channel(16);
        Self {
            runtime,
            state: Arc::new(state),
            events,
        }
    }

    pub fn runtime(&self) -> Runtime {
        self.runtime
    }

    pub fn is_device(&self) -> bool {
        self.runtime == Runtime::Device
    }

    /// Snapshot of the current connectivity
    pub fn connectivity(&self) -> Connectivity {
        *self.state.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.connectivity().online
    }

    /// Device runtime and no connection: network calls must not be attempted.
    pub fn is_device_offline(&self) -> bool {
        self.is_device() && !self.is_online()
    }

    /// Feed a native connection-type signal (device runtime).
    pub fn update_connection_type(&self, connection_type: ConnectionType) {
        self.publish(Connectivity {
            online: connection_type != ConnectionType::None,
            connection_type: Some(connection_type),
        });
    }

    /// Feed the host runtime's online indicator.
    pub fn set_online(&self, online: bool) {
        let connection_type = match (self.runtime, online) {
            (Runtime::Device, true) => Some(ConnectionType::Unknown),
            (Runtime::Device, false) => Some(ConnectionType::None),
            (Runtime::Browser, _) => None,
        };
        self.publish(Connectivity {
            online,
            connection_type,
        });
    }

    /// Watch the raw connectivity state
    pub fn watch(&self) -> watch::Receiver<Connectivity> {
        self.state.subscribe()
    }

    /// Stream of online/offline transitions from now on.
    ///
    /// Lagging subscribers skip missed events instead of ending the stream.
    pub fn events(&self) -> BoxStream<'static, NetworkEvent> {
        let rx = self.events.subscribe();
        stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Network event subscriber lagged by {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }

    fn publish(&self, next: Connectivity) {
        let previous = self.state.send_replace(next);
        if previous.online == next.online {
            return;
        }

        let event = if next.online {
            NetworkEvent::Connected(next.connection_type)
        } else {
            NetworkEvent::Disconnected
        };
        debug!("Connectivity changed: {:?}", event);
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
