//! Typed update-signal channel between a host and a waiting gateway version.
//!
//! The contract is deliberately tiny: the host sends `SkipWaiting` to promote
//! an installed-but-not-active gateway, and the gateway answers with
//! `ControllerChanged` once it has taken over, at which point the host is
//! expected to reload exactly once.

use tokio::sync::mpsc;

/// Messages a host may send to a waiting gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
  /// Promote the waiting gateway immediately
  SkipWaiting,
}

/// Events the gateway reports back to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayEvent {
  /// A new gateway version finished installing and is waiting to activate
  UpdateAvailable { version: u32 },
  /// The waiting gateway activated and now controls fetches
  ControllerChanged { version: u32 },
}

/// Host side of the update channel.
pub struct HostHandle {
  control_tx: mpsc::UnboundedSender<ControlMessage>,
  event_rx: mpsc::UnboundedReceiver<GatewayEvent>,
}

impl HostHandle {
  /// Ask the waiting gateway to activate now.
  pub fn skip_waiting(&self) {
    // Gateway gone means there is nothing to promote
    let _ = self.control_tx.send(ControlMessage::SkipWaiting);
  }

  /// Next gateway event, or None when the gateway side is gone.
  pub async fn next_event(&mut self) -> Option<GatewayEvent> {
    self.event_rx.recv().await
  }
}

/// Gateway side of the update channel.
pub struct GatewaySignal {
  control_rx: mpsc::UnboundedReceiver<ControlMessage>,
  event_tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl GatewaySignal {
  /// Tell the host a new version is installed and waiting.
  pub fn announce_update(&self, version: u32) {
    let _ = self.event_tx.send(GatewayEvent::UpdateAvailable { version });
  }

  /// Tell the host this version now controls fetches.
  pub fn announce_controller(&self, version: u32) {
    let _ = self
      .event_tx
      .send(GatewayEvent::ControllerChanged { version });
  }

  /// Wait until the host asks for promotion. Returns false when the host side
  /// is gone.
  pub async fn wait_for_skip(&mut self) -> bool {
    matches!(self.control_rx.recv().await, Some(ControlMessage::SkipWaiting))
  }
}

/// Build a connected host/gateway pair.
pub fn update_channel() -> (HostHandle, GatewaySignal) {
  let (control_tx, control_rx) = mpsc::unbounded_channel();
  let (event_tx, event_rx) = mpsc::unbounded_channel();

  (
    HostHandle {
      control_tx,
      event_rx,
    },
    GatewaySignal {
      control_rx,
      event_tx,
    },
  )
}
