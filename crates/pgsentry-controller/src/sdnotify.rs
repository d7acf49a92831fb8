//! systemd `NOTIFY_SOCKET` readiness/watchdog integration, ported from
//! `original_source/src/sdnotify.py`. The original quietly no-ops when the
//! socket is unavailable (non-systemd hosts); this keeps that behavior.

use std::os::unix::net::UnixDatagram;

use tracing::debug;

/// Thin wrapper over the systemd notification protocol. Connecting is
/// best-effort: on a non-systemd host `NOTIFY_SOCKET` is unset and every
/// notification silently becomes a no-op.
pub struct Notifier {
    socket: Option<UnixDatagram>,
}

impl Notifier {
    #[must_use]
    pub fn connect() -> Self {
        let socket = Self::connect_socket();
        Self { socket }
    }

    fn connect_socket() -> Option<UnixDatagram> {
        let address = std::env::var("NOTIFY_SOCKET").ok()?;
        let socket = UnixDatagram::unbound().ok()?;
        let address = if let Some(abstract_name) = address.strip_prefix('@') {
            format!("\0{abstract_name}")
        } else {
            address
        };
        match socket.connect(&address) {
            Ok(()) => Some(socket),
            Err(error) => {
                debug!(%error, "could not connect to NOTIFY_SOCKET");
                None
            }
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.socket.is_some()
    }

    fn send(&self, msg: &str) {
        if let Some(socket) = &self.socket {
            if let Err(error) = socket.send(msg.as_bytes()) {
                debug!(%error, "failed to send systemd notification");
            }
        }
    }

    /// Reports completed startup.
    pub fn ready(&self) {
        self.send("READY=1\n");
    }

    /// Reports a healthy iteration, feeding `$WATCHDOG_USEC`.
    pub fn notify(&self) {
        self.send("WATCHDOG=1\n");
    }

    pub fn status(&self, msg: &str) {
        self.send(&format!("STATUS={msg}\n"));
    }

    /// Reports a watchdog failure; the service manager will likely kill us.
    pub fn notify_error(&self, msg: Option<&str>) {
        if let Some(msg) = msg {
            self.status(msg);
        }
        self.send("WATCHDOG=trigger\n");
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::connect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_without_notify_socket() {
        std::env::remove_var("NOTIFY_SOCKET");
        let notifier = Notifier::connect();
        assert!(!notifier.enabled());
        notifier.ready();
        notifier.notify();
    }
}
