//! Muzik accessory access.
//!
//! This module defines the contract between an accessory and whoever wants
//! its connection-state notifications, along with the BlueZ-backed
//! implementation and the logic used to recognise Muzik headphones.

use std::sync::Weak;

use crate::error::Result;

pub mod bluez;
pub mod recognition;
pub mod state;

pub use state::ConnectionState;

/// Receiver of connection-state notifications.
pub trait ConnectionStateCallback: Send + Sync {
   /// Called by the accessory, in order, for every state change.
   fn on_connection_state_change(&self, state: ConnectionState);

   /// Called once when the accessory can no longer report state changes.
   fn on_connection_lost(&self, reason: &str);
}

/// An accessory that reports its connection state.
pub trait Accessory: Send + Sync {
   /// Subscribes `callback` to connection-state changes.
   ///
   /// An accessory holds a single subscriber; subscribing again replaces it.
   /// The subscriber is held weakly and stops receiving notifications once
   /// it is dropped.
   fn register_for_connection_state(&self, callback: Weak<dyn ConnectionStateCallback>)
   -> Result<()>;
}

/// Single-subscriber slot shared between an accessory and its event source.
#[derive(Default)]
pub struct SubscriberSlot {
   subscriber: parking_lot::Mutex<Option<Weak<dyn ConnectionStateCallback>>>,
}

impl SubscriberSlot {
   pub fn new() -> Self {
      Self::default()
   }

   /// Replaces the current subscriber.
   pub fn replace(&self, callback: Weak<dyn ConnectionStateCallback>) {
      *self.subscriber.lock() = Some(callback);
   }

   /// Delivers `state` to the subscriber, returning whether one was alive.
   ///
   /// The slot lock is released before the callback runs, so a subscriber
   /// may re-subscribe from inside the callback.
   pub fn notify(&self, state: ConnectionState) -> bool {
      self.with_subscriber(|callback| callback.on_connection_state_change(state))
   }

   /// Tells the subscriber that no further states will follow.
   pub fn notify_lost(&self, reason: &str) -> bool {
      self.with_subscriber(|callback| callback.on_connection_lost(reason))
   }

   fn with_subscriber(&self, f: impl FnOnce(&dyn ConnectionStateCallback)) -> bool {
      let subscriber = self.subscriber.lock().as_ref().and_then(Weak::upgrade);
      match subscriber {
         Some(callback) => {
            f(&*callback);
            true
         },
         None => false,
      }
   }
}

#[cfg(test)]
mod tests {
   use std::sync::Arc;

   use super::*;

   #[derive(Default)]
   struct Recorder {
      states: parking_lot::Mutex<Vec<ConnectionState>>,
      lost: parking_lot::Mutex<Option<String>>,
   }

   impl ConnectionStateCallback for Recorder {
      fn on_connection_state_change(&self, state: ConnectionState) {
         self.states.lock().push(state);
      }

      fn on_connection_lost(&self, reason: &str) {
         *self.lost.lock() = Some(reason.to_string());
      }
   }

   #[test]
   fn test_empty_slot_drops_notifications() {
      let slot = SubscriberSlot::new();
      assert!(!slot.notify(ConnectionState::Connected));
   }

   #[test]
   fn test_replace_switches_subscriber() {
      let slot = SubscriberSlot::new();
      let first = Arc::new(Recorder::default());
      let second = Arc::new(Recorder::default());

      let weak: Weak<dyn ConnectionStateCallback> = Arc::downgrade(&first) as _;
      slot.replace(weak);
      assert!(slot.notify(ConnectionState::Connecting));

      let weak: Weak<dyn ConnectionStateCallback> = Arc::downgrade(&second) as _;
      slot.replace(weak);
      assert!(slot.notify(ConnectionState::Connected));

      assert_eq!(*first.states.lock(), vec![ConnectionState::Connecting]);
      assert_eq!(*second.states.lock(), vec![ConnectionState::Connected]);
   }

   #[test]
   fn test_dropped_subscriber_is_not_notified() {
      let slot = SubscriberSlot::new();
      let recorder = Arc::new(Recorder::default());
      let weak: Weak<dyn ConnectionStateCallback> = Arc::downgrade(&recorder) as _;
      slot.replace(weak);
      drop(recorder);

      assert!(!slot.notify(ConnectionState::Disconnected));
      assert!(!slot.notify_lost("stream ended"));
   }

   #[test]
   fn test_lost_reaches_subscriber() {
      let slot = SubscriberSlot::new();
      let recorder = Arc::new(Recorder::default());
      let weak: Weak<dyn ConnectionStateCallback> = Arc::downgrade(&recorder) as _;
      slot.replace(weak);

      assert!(slot.notify_lost("stream ended"));
      assert_eq!(recorder.lost.lock().as_deref(), Some("stream ended"));
      assert!(recorder.states.lock().is_empty());
   }
}
