use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use tonechat_types::UserId;
use tonechat_types::events::GatewayEvent;

pub type ConnectionId = Uuid;

/// Canonical, order-independent identity of the conversation between two
/// users. `new(a, b) == new(b, a)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationKey {
    low: UserId,
    high: UserId,
}

impl ConversationKey {
    pub fn new(a: UserId, b: UserId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    /// Both participants, smaller id first.
    pub fn participants(&self) -> (UserId, UserId) {
        (self.low, self.high)
    }
}

/// A named listener group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKey {
    /// Every live connection watching one conversation
    Conversation(ConversationKey),
    /// Every live connection of one user, for cross-conversation notices
    Inbox(UserId),
}

impl GroupKey {
    pub fn conversation(a: UserId, b: UserId) -> Self {
        Self::Conversation(ConversationKey::new(a, b))
    }

    pub fn inbox(user_id: UserId) -> Self {
        Self::Inbox(user_id)
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conversation(key) => write!(f, "t:{}:{}", key.low, key.high),
            Self::Inbox(user_id) => write!(f, "u:{}", user_id),
        }
    }
}

/// Publishing side of the registry. The message pipeline only needs this,
/// which lets tests swap in a recorder.
pub trait Broadcaster: Send + Sync {
    /// Hand `event` to every current member of `group`. Best effort: members
    /// whose connection already went away are skipped. Returns the number of
    /// connections the event was queued for.
    fn publish(&self, group: &GroupKey, event: &GatewayEvent) -> usize;
}

/// Tracks live connections and which listener groups each one belongs to.
#[derive(Clone, Default)]
pub struct GroupRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    /// Outbound queue per live connection
    connections: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<GatewayEvent>>>,

    /// Both directions of the membership relation, kept under one lock so
    /// they never disagree
    membership: RwLock<Membership>,
}

#[derive(Default)]
struct Membership {
    groups: HashMap<GroupKey, HashSet<ConnectionId>>,
    by_connection: HashMap<ConnectionId, HashSet<GroupKey>>,
}

// Lock order everywhere: membership, then connections.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new live connection. Returns its id and the receiver end
    /// of its outbound event queue.
    pub fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        write(&self.inner.connections).insert(conn_id, tx);
        debug!("Connection {} registered", conn_id);
        (conn_id, rx)
    }

    /// Add a live connection to a group. Returns `false` if it was already a
    /// member or is not connected.
    pub fn join(&self, conn_id: ConnectionId, group: GroupKey) -> bool {
        let mut membership = write(&self.inner.membership);
        if !read(&self.inner.connections).contains_key(&conn_id) {
            return false;
        }

        let added = membership.groups.entry(group).or_default().insert(conn_id);
        membership.by_connection.entry(conn_id).or_default().insert(group);
        if added {
            trace!("Connection {} joined {}", conn_id, group);
        }
        added
    }

    /// Remove a connection from a group. Not being a member is fine.
    pub fn leave(&self, conn_id: ConnectionId, group: GroupKey) -> bool {
        let mut membership = write(&self.inner.membership);
        let removed = membership.remove(conn_id, group);
        if removed {
            trace!("Connection {} left {}", conn_id, group);
        }
        removed
    }

    /// Forget a connection: drop it from every group and close its queue.
    pub fn disconnect(&self, conn_id: ConnectionId) {
        let mut membership = write(&self.inner.membership);
        let groups = membership.by_connection.remove(&conn_id).unwrap_or_default();
        for group in &groups {
            membership.remove_member(conn_id, *group);
        }
        write(&self.inner.connections).remove(&conn_id);
        debug!("Connection {} removed from {} groups", conn_id, groups.len());
    }

    pub fn members_of(&self, group: &GroupKey) -> HashSet<ConnectionId> {
        read(&self.inner.membership)
            .groups
            .get(group)
            .cloned()
            .unwrap_or_default()
    }

    pub fn groups_of(&self, conn_id: ConnectionId) -> HashSet<GroupKey> {
        read(&self.inner.membership)
            .by_connection
            .get(&conn_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn connection_count(&self) -> usize {
        read(&self.inner.connections).len()
    }

    /// Number of groups with at least one member.
    pub fn group_count(&self) -> usize {
        read(&self.inner.membership).groups.len()
    }
}

impl Membership {
    fn remove(&mut self, conn_id: ConnectionId, group: GroupKey) -> bool {
        let removed = self.remove_member(conn_id, group);
        if let Some(groups) = self.by_connection.get_mut(&conn_id) {
            groups.remove(&group);
            if groups.is_empty() {
                self.by_connection.remove(&conn_id);
            }
        }
        removed
    }

    /// Drop one side of the relation; empty groups are discarded.
    fn remove_member(&mut self, conn_id: ConnectionId, group: GroupKey) -> bool {
        let Some(members) = self.groups.get_mut(&group) else {
            return false;
        };
        let removed = members.remove(&conn_id);
        if members.is_empty() {
            self.groups.remove(&group);
        }
        removed
    }
}

impl Broadcaster for GroupRegistry {
    fn publish(&self, group: &GroupKey, event: &GatewayEvent) -> usize {
        let membership = read(&self.inner.membership);
        let Some(members) = membership.groups.get(group) else {
            return 0;
        };

        let connections = read(&self.inner.connections);
        let delivered = members
            .iter()
            .filter_map(|conn_id| connections.get(conn_id))
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count();

        trace!("Published to {} ({} of {} members)", group, delivered, members.len());
        delivered
    }
}
