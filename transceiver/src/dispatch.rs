//! Typed packet dispatch with ordered, one-shot-capable handler lists.
//!
//! Each packet kind owns one [`HandlerList`]; registration order is
//! invocation order. A dispatch pass iterates a snapshot of the list taken
//! under the lock, so register/unregister from another thread (or from
//! inside a handler) never skips or double-invokes a handler in the
//! current pass. One-shot handlers are pruned after the pass completes.

use comms_wire::{
    ConfigData, Envelope, ErrorData, NoConfigData, NoPingData, Packet, PacketBody, PingData,
    RequestConfigData, RequestPingData,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Token identifying a registered handler.
///
/// Registration tokens stand in for callback identity: `unregister` removes
/// the first entry carrying the token and reports whether one was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

fn next_handler_id() -> HandlerId {
    HandlerId(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
}

/// A registered callback for one packet kind.
pub type Handler<T> = Arc<dyn Fn(&Envelope, &T) + Send + Sync>;

struct Registration<T> {
    id: HandlerId,
    callback: Handler<T>,
    one_shot: bool,
}

/// Ordered handler sequence for a single packet kind.
pub struct HandlerList<T> {
    entries: Mutex<Vec<Registration<T>>>,
}

impl<T> HandlerList<T> {
    fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Append a handler. When `one_shot` is set the handler is removed
    /// after its first invocation.
    pub fn register(
        &self,
        callback: impl Fn(&Envelope, &T) + Send + Sync + 'static,
        one_shot: bool,
    ) -> HandlerId {
        let id = next_handler_id();
        self.entries.lock().unwrap().push(Registration {
            id,
            callback: Arc::new(callback),
            one_shot,
        });
        id
    }

    /// Remove the first handler carrying `id`. Returns whether one was
    /// found; unknown tokens leave the list untouched.
    pub fn unregister(&self, id: HandlerId) -> bool {
        let mut entries = self.entries.lock().unwrap();
        match entries.iter().position(|r| r.id == id) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Number of currently registered handlers.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dispatch(&self, envelope: &Envelope, data: &T) {
        // Snapshot under the lock, invoke outside it: a handler registered
        // mid-pass is not invoked this pass, and handlers may themselves
        // register or unregister without deadlocking.
        let snapshot: Vec<(HandlerId, Handler<T>, bool)> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .map(|r| (r.id, Arc::clone(&r.callback), r.one_shot))
            .collect();

        let mut spent = Vec::new();
        for (id, callback, one_shot) in snapshot {
            callback(envelope, data);
            if one_shot {
                spent.push(id);
            }
        }

        if !spent.is_empty() {
            self.entries
                .lock()
                .unwrap()
                .retain(|r| !spent.contains(&r.id));
        }
    }
}

impl<T> Default for HandlerList<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Routes decoded packets to per-kind handler lists.
#[derive(Default)]
pub struct Dispatcher {
    config: HandlerList<ConfigData>,
    no_config: HandlerList<NoConfigData>,
    ping: HandlerList<PingData>,
    no_ping: HandlerList<NoPingData>,
    request_config: HandlerList<RequestConfigData>,
    request_ping: HandlerList<RequestPingData>,
    error: HandlerList<ErrorData>,
}

impl Dispatcher {
    /// Create a dispatcher with empty handler lists.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handlers for configuration packets.
    pub fn config(&self) -> &HandlerList<ConfigData> {
        &self.config
    }

    /// Handlers for no-config replies.
    pub fn no_config(&self) -> &HandlerList<NoConfigData> {
        &self.no_config
    }

    /// Handlers for ping packets.
    pub fn ping(&self) -> &HandlerList<PingData> {
        &self.ping
    }

    /// Handlers for no-ping replies.
    pub fn no_ping(&self) -> &HandlerList<NoPingData> {
        &self.no_ping
    }

    /// Handlers for config requests.
    pub fn request_config(&self) -> &HandlerList<RequestConfigData> {
        &self.request_config
    }

    /// Handlers for ping requests.
    pub fn request_ping(&self) -> &HandlerList<RequestPingData> {
        &self.request_ping
    }

    /// Handlers for error reports.
    pub fn error(&self) -> &HandlerList<ErrorData> {
        &self.error
    }

    /// Invoke the registered handlers for the packet's active variant, in
    /// registration order. A packet with no variant set invokes nothing.
    pub fn route(&self, packet: &Packet) {
        let envelope = &packet.envelope;
        match &packet.body {
            PacketBody::None => {
                debug!(
                    origin = envelope.origin_node_id,
                    "packet with no variant set; ignoring"
                );
            }
            PacketBody::Config(data) => self.config.dispatch(envelope, data),
            PacketBody::NoConfig(data) => self.no_config.dispatch(envelope, data),
            PacketBody::Ping(data) => self.ping.dispatch(envelope, data),
            PacketBody::NoPing(data) => self.no_ping.dispatch(envelope, data),
            PacketBody::RequestConfig(data) => self.request_config.dispatch(envelope, data),
            PacketBody::RequestPing(data) => self.request_ping.dispatch(envelope, data),
            PacketBody::Error(data) => self.error.dispatch(envelope, data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn ping_packet() -> Packet {
        Packet::new(
            Envelope {
                origin_node_id: 1,
                timestamp_us: 10,
            },
            PacketBody::Ping(PingData {
                frequency: 150_000.0,
                amplitude: 0.4,
                latitude: 32.88,
                longitude: -117.23,
                altitude: 120.0,
            }),
        )
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let dispatcher = Dispatcher::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            dispatcher
                .ping()
                .register(move |_, _| order.lock().unwrap().push(label), false);
        }

        dispatcher.route(&ping_packet());
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn one_shot_handler_fires_exactly_once() {
        let dispatcher = Dispatcher::new();
        let once_count = Arc::new(AtomicUsize::new(0));
        let always_count = Arc::new(AtomicUsize::new(0));

        {
            let once_count = Arc::clone(&once_count);
            dispatcher.ping().register(
                move |_, _| {
                    once_count.fetch_add(1, Ordering::SeqCst);
                },
                true,
            );
        }
        {
            let always_count = Arc::clone(&always_count);
            dispatcher.ping().register(
                move |_, _| {
                    always_count.fetch_add(1, Ordering::SeqCst);
                },
                false,
            );
        }

        dispatcher.route(&ping_packet());
        dispatcher.route(&ping_packet());

        assert_eq!(once_count.load(Ordering::SeqCst), 1);
        assert_eq!(always_count.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.ping().len(), 1);
    }

    #[test]
    fn unregister_unknown_token_is_harmless() {
        let dispatcher = Dispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));
        let id = {
            let count = Arc::clone(&count);
            dispatcher.config().register(
                move |_, _| {
                    count.fetch_add(1, Ordering::SeqCst);
                },
                false,
            )
        };

        let stale = dispatcher.ping().register(|_, _| {}, false);
        assert!(dispatcher.ping().unregister(stale));
        assert!(!dispatcher.ping().unregister(stale));
        assert!(!dispatcher.config().unregister(stale));

        assert!(dispatcher.config().unregister(id));
        assert!(dispatcher.config().is_empty());
    }

    #[test]
    fn handler_registered_mid_pass_waits_for_next_pass() {
        let dispatcher = Arc::new(Dispatcher::new());
        let late_count = Arc::new(AtomicUsize::new(0));

        {
            let dispatcher = Arc::clone(&dispatcher);
            let late_count = Arc::clone(&late_count);
            dispatcher.clone().ping().register(
                move |_, _| {
                    let late_count = Arc::clone(&late_count);
                    dispatcher.ping().register(
                        move |_, _| {
                            late_count.fetch_add(1, Ordering::SeqCst);
                        },
                        false,
                    );
                },
                true,
            );
        }

        dispatcher.route(&ping_packet());
        assert_eq!(late_count.load(Ordering::SeqCst), 0);

        dispatcher.route(&ping_packet());
        assert_eq!(late_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn none_variant_invokes_nothing() {
        let dispatcher = Dispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let count = Arc::clone(&count);
            dispatcher.error().register(
                move |_, _| {
                    count.fetch_add(1, Ordering::SeqCst);
                },
                false,
            );
        }

        dispatcher.route(&Packet::new(
            Envelope {
                origin_node_id: 1,
                timestamp_us: 10,
            },
            PacketBody::None,
        ));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn envelope_reaches_handlers() {
        let dispatcher = Dispatcher::new();
        let seen = Arc::new(Mutex::new(None));
        {
            let seen = Arc::clone(&seen);
            dispatcher.ping().register(
                move |envelope, data| {
                    *seen.lock().unwrap() = Some((*envelope, *data));
                },
                false,
            );
        }

        let packet = ping_packet();
        dispatcher.route(&packet);

        let (envelope, data) = seen.lock().unwrap().take().unwrap();
        assert_eq!(envelope.origin_node_id, 1);
        assert_eq!(envelope.timestamp_us, 10);
        assert_eq!(PacketBody::Ping(data), packet.body);
    }
}
