//! Connection-state relay.
//!
//! The relay subscribes itself to an accessory and forwards every
//! connection-state change to the most recently registered callback as an
//! `OK` result that keeps the callback open.

use std::{
   cell::RefCell,
   sync::{Arc, Weak},
};

use log::{debug, info};
use parking_lot::ReentrantMutex;
use smol_str::SmolStr;

use crate::{
   accessory::{Accessory, ConnectionState, ConnectionStateCallback},
   error::Result,
   plugin::{CallbackContext, PluginResult, Status},
};

/// Forwards accessory connection-state changes to a single listener.
///
/// Registration and delivery share one re-entrant lock, so the accessory
/// may deliver synchronously from inside [`register`](Self::register), and
/// a result sink may register a new listener while a result is in flight.
pub struct ConnectionStateRelay<A: ?Sized> {
   this: Weak<Self>,
   listener: ReentrantMutex<RefCell<Option<Arc<CallbackContext>>>>,
   accessory: Arc<A>,
}

impl<A: Accessory + ?Sized + 'static> ConnectionStateRelay<A> {
   pub fn new(accessory: Arc<A>) -> Arc<Self> {
      Arc::new_cyclic(|this| Self {
         this: this.clone(),
         listener: ReentrantMutex::new(RefCell::new(None)),
         accessory,
      })
   }

   pub fn accessory(&self) -> &Arc<A> {
      &self.accessory
   }

   /// Makes `listener` the target for all further state changes and
   /// subscribes this relay to the accessory.
   ///
   /// The listener is stored even when subscribing fails; the error is
   /// returned unchanged.
   pub fn register(&self, listener: CallbackContext) -> Result<()> {
      let guard = self.listener.lock();
      let callback_id = listener.callback_id().clone();
      let previous = guard.borrow_mut().replace(Arc::new(listener));
      if let Some(previous) = previous {
         debug!(
            "Listener {} replaced by {callback_id}",
            previous.callback_id()
         );
      }
      info!("Registered connection-state listener {callback_id}");

      let this: Weak<dyn ConnectionStateCallback> = self.this.clone();
      self.accessory.register_for_connection_state(this)
   }

   /// Sends `result` to the current listener with the lock held but the
   /// listener slot released.
   fn send(&self, result: PluginResult) {
      let guard = self.listener.lock();
      let listener = guard.borrow().clone();
      let Some(listener) = listener else {
         debug!(
            "No listener registered, dropping {} {}",
            result.status(),
            result.message()
         );
         return;
      };

      let (status, message) = (result.status(), SmolStr::new(result.message()));
      if listener.send_plugin_result(result) {
         debug!("Sent {status} {message} to {}", listener.callback_id());
      }
   }
}

impl<A: Accessory + ?Sized + 'static> ConnectionStateCallback for ConnectionStateRelay<A> {
   fn on_connection_state_change(&self, state: ConnectionState) {
      let mut result = PluginResult::new(Status::Ok, state.name());
      result.set_keep_callback(true);
      self.send(result);
   }

   fn on_connection_lost(&self, reason: &str) {
      self.send(PluginResult::new(Status::Error, reason));
   }
}
