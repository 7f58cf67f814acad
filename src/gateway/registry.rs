use std::collections::HashMap;
use std::fmt;

use tracing::{debug, trace};

use crate::emitter::CancelHook;
use crate::transport::TransportHandle;

// -----------------------------------------------------------------------------
// ----- Ids -------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

// -----------------------------------------------------------------------------
// ----- Connection ------------------------------------------------------------

#[derive(Debug)]
struct Connection<H> {
    handle: H,
    closed: bool,
    /// `end` was issued; waiting for the transport's close-notification.
    ending: bool,
    hooks: HashMap<RequestId, CancelHook>,
}

// -----------------------------------------------------------------------------
// ----- ConnectionRegistry ----------------------------------------------------

/// Open connections and, per connection, the cancel hooks of its requests
/// still in flight.
///
/// Owned by the gateway loop; nothing else mutates it, so there is no lock.
#[derive(Debug)]
pub struct ConnectionRegistry<H> {
    connections: HashMap<ConnectionId, Connection<H>>,
    next_id: u64,
}

impl<H> Default for ConnectionRegistry<H> {
    fn default() -> Self {
        Self {
            connections: HashMap::new(),
            next_id: 1,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- ConnectionRegistry: Public --------------------------------------------

impl<H: TransportHandle> ConnectionRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, handle: H) -> ConnectionId {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;

        self.connections.insert(
            id,
            Connection {
                handle,
                closed: false,
                ending: false,
                hooks: HashMap::new(),
            },
        );

        debug!("{id} opened ({} open)", self.connections.len());
        id
    }

    /// Track `hook` until the request settles. If the connection is already
    /// gone the hook fires on the spot and false is returned.
    pub fn register(&mut self, id: ConnectionId, request: RequestId, hook: CancelHook) -> bool {
        match self.connections.get_mut(&id) {
            Some(conn) if !conn.closed && !conn.ending => {
                conn.hooks.insert(request, hook);
                true
            }
            _ => {
                trace!("{id} gone; cancelling {request} immediately");
                hook.cancel();
                false
            }
        }
    }

    /// Stop taking new requests on `id` once its socket was told to end.
    /// Returns false if it was already ending or is gone.
    pub fn mark_ending(&mut self, id: ConnectionId) -> bool {
        match self.connections.get_mut(&id) {
            Some(conn) if !conn.closed && !conn.ending => {
                conn.ending = true;
                true
            }
            _ => false,
        }
    }

    pub fn is_ending(&self, id: ConnectionId) -> bool {
        self.connections.get(&id).is_some_and(|conn| conn.ending)
    }

    /// Forget a settled request's hook without firing it.
    pub fn unregister(&mut self, id: ConnectionId, request: RequestId) -> bool {
        self.connections
            .get_mut(&id)
            .and_then(|conn| conn.hooks.remove(&request))
            .is_some()
    }

    pub fn is_pending(&self, id: ConnectionId, request: RequestId) -> bool {
        self.connections
            .get(&id)
            .is_some_and(|conn| !conn.closed && conn.hooks.contains_key(&request))
    }

    /// The transport handle, as long as the connection is open.
    pub fn handle(&self, id: ConnectionId) -> Option<&H> {
        self.connections
            .get(&id)
            .filter(|conn| !conn.closed)
            .map(|conn| &conn.handle)
    }

    /// Mark closed, fire every outstanding hook once, drop the entry.
    /// Returns how many hooks fired; closing twice fires nothing.
    pub fn close(&mut self, id: ConnectionId) -> usize {
        let Some(conn) = self.connections.get_mut(&id) else {
            return 0;
        };

        conn.closed = true;

        let hooks: Vec<CancelHook> = conn.hooks.drain().map(|(_, hook)| hook).collect();
        let cancelled = hooks.len();
        for hook in hooks {
            hook.cancel();
        }

        self.connections.remove(&id);

        debug!(
            "{id} closed, {cancelled} request(s) cancelled ({} open)",
            self.connections.len()
        );
        cancelled
    }

    /// End every open connection with `code`/`reason`, then close it.
    /// Connections already ending are closed without a second `end`.
    /// Returns how many connections were ended.
    pub fn close_all(&mut self, code: u16, reason: &str) -> usize {
        let mut ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        ids.sort();

        for id in &ids {
            // a socket that is already ending got its close instruction
            if let Some(conn) = self.connections.get(id).filter(|conn| !conn.ending) {
                conn.handle.end(code, reason);
            }
            self.close(*id);
        }

        self.connections.clear();
        ids.len()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn pending_requests(&self, id: ConnectionId) -> usize {
        self.connections.get(&id).map_or(0, |conn| conn.hooks.len())
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
