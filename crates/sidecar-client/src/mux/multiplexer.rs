//! Event multiplexer: fans inbound events out to subscriptions.
//!
//! Global subscriptions see every event. Request-scoped subscriptions see
//! only events carrying their request id and are closed automatically when
//! that request's turn-end boundary is published.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use super::subscription::{Subscription, SubscriptionHandle, SubscriptionId};
use super::Event;

/// Registry counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiplexerStats {
    /// Live global subscriptions.
    pub global: usize,
    /// Request ids with at least one live subscription.
    pub requests: usize,
    /// Live request-scoped subscriptions across all requests.
    pub request_subscriptions: usize,
    /// Recently ended request ids still remembered.
    pub ended: usize,
}

/// Number of ended request ids remembered by default.
pub const DEFAULT_ENDED_CAPACITY: usize = 1024;

/// Recently ended request ids, oldest forgotten first.
#[derive(Debug)]
struct EndedRequests {
    order: VecDeque<String>,
    ids: HashSet<String>,
    capacity: usize,
}

impl EndedRequests {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            ids: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    fn insert(&mut self, request_id: &str) {
        if !self.ids.insert(request_id.to_string()) {
            return;
        }
        self.order.push_back(request_id.to_string());
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    fn contains(&self, request_id: &str) -> bool {
        self.ids.contains(request_id)
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

#[derive(Debug)]
struct Registry {
    global: Vec<SubscriptionHandle>,
    by_request: HashMap<String, Vec<SubscriptionHandle>>,
    /// Requests whose turn-end has been published.
    ended: EndedRequests,
    closed: bool,
}

/// Routes published events to global and request-scoped subscriptions.
#[derive(Debug)]
pub struct EventMultiplexer {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
}

impl Default for EventMultiplexer {
    fn default() -> Self {
        Self::with_ended_capacity(DEFAULT_ENDED_CAPACITY)
    }
}

impl EventMultiplexer {
    /// Create a multiplexer with the default ended-request memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a multiplexer remembering at most `capacity` ended request
    /// ids. A request forgotten here can be subscribed to again.
    pub fn with_ended_capacity(capacity: usize) -> Self {
        Self {
            registry: Mutex::new(Registry {
                global: Vec::new(),
                by_request: HashMap::new(),
                ended: EndedRequests::new(capacity),
                closed: false,
            }),
            next_id: AtomicU64::new(0),
        }
    }

    fn mint_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Subscribe to every event of the session.
    ///
    /// On a closed multiplexer the subscription is already closed.
    pub fn subscribe_all(&self, buffer: usize) -> Subscription {
        let id = self.mint_id();
        let mut registry = self.registry.lock();
        if registry.closed {
            return Subscription::closed(id, None);
        }
        let (subscription, handle) = Subscription::open(id, None, buffer);
        registry.global.push(handle);
        drop(registry);
        debug!(subscription = %id, "Global subscription opened");
        subscription
    }

    /// Subscribe to the events of one request.
    ///
    /// On a closed multiplexer, or for a request whose turn-end was already
    /// published, the subscription is already closed and delivers nothing.
    pub fn subscribe_request(&self, request_id: &str, buffer: usize) -> Subscription {
        let id = self.mint_id();
        let mut registry = self.registry.lock();
        if registry.closed || registry.ended.contains(request_id) {
            return Subscription::closed(id, Some(request_id.to_string()));
        }
        let (subscription, handle) = Subscription::open(id, Some(request_id.to_string()), buffer);
        registry
            .by_request
            .entry(request_id.to_string())
            .or_default()
            .push(handle);
        drop(registry);
        debug!(subscription = %id, request_id, "Request subscription opened");
        subscription
    }

    /// Remove a request-scoped subscription before its turn ends and close it.
    pub fn unsubscribe_request(&self, request_id: &str, id: SubscriptionId) {
        let mut registry = self.registry.lock();
        let Some(group) = registry.by_request.get_mut(request_id) else {
            return;
        };
        if let Some(pos) = group.iter().position(|h| h.id() == id) {
            group.remove(pos).close();
        }
        if group.is_empty() {
            registry.by_request.remove(request_id);
        }
    }

    /// Remove a global subscription and close it.
    pub fn unsubscribe_all(&self, id: SubscriptionId) {
        let mut registry = self.registry.lock();
        if let Some(pos) = registry.global.iter().position(|h| h.id() == id) {
            registry.global.remove(pos).close();
        }
    }

    /// Publish one event.
    ///
    /// Routing, enqueueing, and turn-end eviction happen under one lock, so
    /// a subscription can never observe an event after the turn-end that
    /// closed it. Enqueueing never blocks. Subscriptions whose consumer has
    /// gone away are pruned here.
    pub fn publish(&self, event: Event) {
        let mut registry = self.registry.lock();
        if registry.closed {
            return;
        }

        registry.global.retain(|h| h.enqueue(&event));

        let Some(request_id) = event.request_id() else {
            return;
        };

        if let Some(group) = registry.by_request.get_mut(request_id) {
            group.retain(|h| h.enqueue(&event));
        }

        if event.is_turn_end() {
            registry.ended.insert(request_id);
            if let Some(group) = registry.by_request.remove(request_id) {
                for handle in &group {
                    handle.close();
                }
                debug!(request_id, closed = group.len(), "Request turn ended, subscriptions closed");
            }
        } else if registry
            .by_request
            .get(request_id)
            .is_some_and(Vec::is_empty)
        {
            registry.by_request.remove(request_id);
        }
    }

    /// Close every subscription. Idempotent; later publishes are dropped.
    pub fn close(&self) {
        let mut registry = self.registry.lock();
        if registry.closed {
            return;
        }
        registry.closed = true;
        let global = std::mem::take(&mut registry.global);
        let by_request = std::mem::take(&mut registry.by_request);
        drop(registry);

        for handle in global.iter().chain(by_request.values().flatten()) {
            handle.close();
        }
        debug!(
            global = global.len(),
            requests = by_request.len(),
            "Multiplexer closed"
        );
    }

    /// Whether [`EventMultiplexer::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.registry.lock().closed
    }

    /// Snapshot of the registry counts.
    pub fn stats(&self) -> MultiplexerStats {
        let registry = self.registry.lock();
        MultiplexerStats {
            global: registry.global.len(),
            requests: registry.by_request.len(),
            request_subscriptions: registry.by_request.values().map(Vec::len).sum(),
            ended: registry.ended.len(),
        }
    }
}
