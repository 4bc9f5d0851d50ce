//! Replicated field primitive
//!
//! A `ReplicatedField<T>` owns one value, a write policy and an ordered list
//! of change callbacks. On the authority, `set` updates the value, runs every
//! callback synchronously and queues the new value for propagation. On an
//! observer, `apply_remote` installs a delivered value and runs the same
//! callbacks. Last writer wins; there is only ever one writer.

use crate::authority::{ReadPolicy, Role, WritePolicy};
use crate::error::{SyncError, SyncResult};
use std::fmt;

/// Handle returned by [`ReplicatedField::subscribe`].
pub type SubscriptionId = u64;

type ChangeCallback<T> = Box<dyn FnMut(&T, &T) + Send>;

pub struct ReplicatedField<T> {
    name: &'static str,
    value: T,
    role: Role,
    write_policy: WritePolicy,
    read_policy: ReadPolicy,
    /// Bumped on every accepted change; carried on the wire so observers can
    /// drop values that arrive out of order.
    revision: u32,
    pending: Vec<(u32, T)>,
    subscribers: Vec<(SubscriptionId, ChangeCallback<T>)>,
    next_subscription: SubscriptionId,
}

impl<T: Clone + PartialEq> ReplicatedField<T> {
    /// Creates an authority-only field owned by a process with `role`.
    pub fn new(name: &'static str, role: Role, value: T) -> Self {
        Self::with_policy(name, role, WritePolicy::AuthorityOnly, value)
    }

    pub fn with_policy(name: &'static str, role: Role, write_policy: WritePolicy, value: T) -> Self {
        Self {
            name,
            value,
            role,
            write_policy,
            read_policy: ReadPolicy::Everyone,
            revision: 0,
            pending: Vec::new(),
            subscribers: Vec::new(),
            next_subscription: 1,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Latest value known to this process.
    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn value(&self) -> T {
        self.value.clone()
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn write_policy(&self) -> WritePolicy {
        self.write_policy
    }

    pub fn read_policy(&self) -> ReadPolicy {
        self.read_policy
    }

    pub fn can_write(&self) -> bool {
        match self.write_policy {
            WritePolicy::AuthorityOnly => self.role.is_authority(),
            WritePolicy::Everyone => true,
        }
    }

    /// Writes a new value.
    ///
    /// Rejected with `AuthorityViolation` on a process that may not write this
    /// field. Writing the current value again is not a change and fires nothing.
    pub fn set(&mut self, value: T) -> SyncResult<()> {
        if !self.can_write() {
            return Err(SyncError::AuthorityViolation { field: self.name });
        }
        if value == self.value {
            return Ok(());
        }

        self.revision = self.revision.wrapping_add(1);
        self.pending.push((self.revision, value.clone()));
        let previous = std::mem::replace(&mut self.value, value);
        self.notify(&previous);
        Ok(())
    }

    /// Installs a value delivered by the authority.
    ///
    /// Returns false when the revision is older than what this process already
    /// holds, which keeps each field's values in authority order. An equal
    /// revision carries the same value (a duplicate or the spawn-time value)
    /// and is installed without firing when nothing changed.
    pub fn apply_remote(&mut self, revision: u32, value: T) -> bool {
        if revision < self.revision {
            return false;
        }
        self.revision = revision;
        if value == self.value {
            return true;
        }
        let previous = std::mem::replace(&mut self.value, value);
        self.notify(&previous);
        true
    }

    /// Takes every change made since the last drain, oldest first.
    pub fn drain_pending(&mut self) -> Vec<(u32, T)> {
        std::mem::take(&mut self.pending)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Current revision and value, for late joiners.
    pub fn snapshot(&self) -> (u32, T) {
        (self.revision, self.value.clone())
    }

    /// Registers a callback fired with `(previous, current)` on every change.
    /// Callbacks run in registration order.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&T, &T) + Send + 'static,
    {
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub, _)| *sub != id);
        self.subscribers.len() != before
    }

    /// Drops every callback. Called before the owning entity is despawned.
    pub fn clear_subscribers(&mut self) {
        self.subscribers.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn notify(&mut self, previous: &T) {
        for (_, callback) in self.subscribers.iter_mut() {
            callback(previous, &self.value);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ReplicatedField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicatedField")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("revision", &self.revision)
            .field("role", &self.role)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder() -> (Arc<Mutex<Vec<(i32, i32)>>>, impl FnMut(&i32, &i32) + Send) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        (log, move |prev: &i32, cur: &i32| {
            sink.lock().unwrap().push((*prev, *cur))
        })
    }

    #[test]
    fn test_authority_set_fires_callbacks() {
        let mut field = ReplicatedField::new("health", Role::Authority, 100);
        let (log, cb) = recorder();
        field.subscribe(cb);

        field.set(90).unwrap();
        field.set(80).unwrap();

        assert_eq!(*field.get(), 80);
        assert_eq!(field.revision(), 2);
        assert_eq!(*log.lock().unwrap(), vec![(100, 90), (90, 80)]);
        assert_eq!(field.drain_pending(), vec![(1, 90), (2, 80)]);
        assert!(!field.has_pending());
    }

    #[test]
    fn test_observer_cannot_write_authority_field() {
        let mut field = ReplicatedField::new("health", Role::Observer, 100);
        let (log, cb) = recorder();
        field.subscribe(cb);

        let result = field.set(0);
        assert!(matches!(
            result,
            Err(SyncError::AuthorityViolation { field: "health" })
        ));
        assert_eq!(*field.get(), 100);
        assert!(log.lock().unwrap().is_empty());
        assert!(!field.has_pending());
    }

    #[test]
    fn test_host_can_write() {
        let mut field = ReplicatedField::new("flashlight", Role::Host, true);
        assert!(field.set(false).is_ok());
        assert!(!*field.get());
    }

    #[test]
    fn test_everyone_policy_allows_observer_write() {
        let mut field =
            ReplicatedField::with_policy("note", Role::Observer, WritePolicy::Everyone, 0);
        assert!(field.set(3).is_ok());
        assert_eq!(*field.get(), 3);
    }

    #[test]
    fn test_same_value_is_not_a_change() {
        let mut field = ReplicatedField::new("dead", Role::Authority, false);
        let (log, cb) = {
            let log = Arc::new(Mutex::new(0));
            let sink = Arc::clone(&log);
            (log, move |_: &bool, _: &bool| *sink.lock().unwrap() += 1)
        };
        field.subscribe(cb);
        field.set(false).unwrap();
        assert_eq!(*log.lock().unwrap(), 0);
        assert_eq!(field.revision(), 0);
    }

    #[test]
    fn test_apply_remote_drops_stale_revisions() {
        let mut mirror = ReplicatedField::new("health", Role::Observer, 100);
        let (log, cb) = recorder();
        mirror.subscribe(cb);

        assert!(mirror.apply_remote(2, 80));
        assert!(!mirror.apply_remote(1, 90));
        assert!(mirror.apply_remote(3, 70));
        assert!(mirror.apply_remote(3, 70));

        assert_eq!(*mirror.get(), 70);
        assert_eq!(*log.lock().unwrap(), vec![(100, 80), (80, 70)]);
    }

    #[test]
    fn test_apply_remote_installs_spawn_value() {
        let mut mirror = ReplicatedField::new("color", Role::Observer, 0u8);
        assert!(mirror.apply_remote(0, 5));
        assert_eq!(*mirror.get(), 5);
    }

    #[test]
    fn test_callbacks_fire_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut field = ReplicatedField::new("color", Role::Authority, 0u8);
        for tag in 0..3 {
            let order = Arc::clone(&order);
            field.subscribe(move |_, _| order.lock().unwrap().push(tag));
        }
        field.set(1).unwrap();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_unsubscribe_and_clear() {
        let mut field = ReplicatedField::new("health", Role::Authority, 100);
        let (log, cb) = recorder();
        let id = field.subscribe(cb);
        assert!(field.unsubscribe(id));
        assert!(!field.unsubscribe(id));
        field.set(50).unwrap();
        assert!(log.lock().unwrap().is_empty());

        field.subscribe(|_, _| {});
        field.subscribe(|_, _| {});
        assert_eq!(field.subscriber_count(), 2);
        field.clear_subscribers();
        assert_eq!(field.subscriber_count(), 0);
    }
}
