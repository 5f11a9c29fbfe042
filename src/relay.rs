//! Fan-out of decoded/raw NMEA lines to a set of named output queues.

use std::collections::HashSet;
use std::sync::Mutex;

use bytes::Bytes;
use log::trace;
use tokio::sync::mpsc::UnboundedSender;

/// One named line source broadcasting to a fixed set of named output
/// queues, any of which can be independently turned on/off at runtime
/// (the UDP sender disables its relay targets while the socket is down;
/// re-enables them once it reconnects).
pub struct SentenceRelay {
    name: String,
    targets: Vec<(String, UnboundedSender<Bytes>)>,
    disabled: Mutex<HashSet<String>>,
}

impl SentenceRelay {
    pub fn new(name: impl Into<String>, targets: Vec<(String, UnboundedSender<Bytes>)>) -> Self {
        Self {
            name: name.into(),
            targets,
            disabled: Mutex::new(HashSet::new()),
        }
    }

    /// Enqueue `line` to every enabled target, in registration order.
    /// Never blocks: the channels are unbounded, so a stalled consumer
    /// accumulates backlog rather than stalling this relay.
    pub fn put(&self, line: Bytes) {
        let disabled = self.disabled.lock().unwrap();
        for (target, sender) in &self.targets {
            if disabled.contains(target) {
                continue;
            }
            if sender.send(line.clone()).is_err() {
                trace!("relay {}: target {target} has no receiver left", self.name);
            }
        }
    }

    /// Disable `target`. Unconditional set-membership, unlike the source
    /// this crate is descended from — see the design notes for why that
    /// matters.
    pub fn disable(&self, target: &str) {
        self.disabled.lock().unwrap().insert(target.to_string());
    }

    pub fn enable(&self, target: &str) {
        self.disabled.lock().unwrap().remove(target);
    }

    pub fn is_disabled(&self, target: &str) -> bool {
        self.disabled.lock().unwrap().contains(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(name: &str) -> (String, UnboundedSender<Bytes>, tokio::sync::mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (name.to_string(), tx, rx)
    }

    #[test]
    fn put_fans_out_in_registration_order_and_skips_disabled() {
        let (name_a, tx_a, mut rx_a) = target("a");
        let (name_b, tx_b, mut rx_b) = target("b");
        let relay = SentenceRelay::new("test", vec![(name_a, tx_a), (name_b, tx_b)]);

        relay.disable("b");
        relay.put(Bytes::from_static(b"$GPRMC*00\r\n"));

        assert_eq!(rx_a.try_recv().unwrap(), Bytes::from_static(b"$GPRMC*00\r\n"));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn disable_is_unconditional_unlike_the_source_bug() {
        let (name_a, tx_a, mut rx_a) = target("a");
        let relay = SentenceRelay::new("test", vec![(name_a, tx_a)]);

        // A single disable() call must take effect immediately, not only
        // on the second call.
        relay.disable("a");
        relay.put(Bytes::from_static(b"x"));
        assert!(rx_a.try_recv().is_err());

        relay.enable("a");
        relay.put(Bytes::from_static(b"x"));
        assert!(rx_a.try_recv().is_ok());
    }
}
