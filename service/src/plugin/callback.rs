//! Callback handles through which results reach the host.

use std::sync::{
   Arc,
   atomic::{AtomicBool, Ordering},
};

use log::warn;
use smol_str::SmolStr;

use crate::plugin::PluginResult;

/// Destination for plugin results.
pub trait ResultSink: Send + Sync {
   /// Hands a result for `callback_id` to the host. Must not block.
   fn deliver(&self, callback_id: &SmolStr, result: PluginResult);
}

/// Type alias for a thread-safe result sink.
pub type ResultSender = Arc<dyn ResultSink>;

/// Handle for one host callback.
///
/// Once a result without `keep_callback` has been sent the context is
/// finished and further results are dropped.
pub struct CallbackContext {
   callback_id: SmolStr,
   sink: ResultSender,
   finished: AtomicBool,
}

impl CallbackContext {
   pub fn new(callback_id: impl Into<SmolStr>, sink: ResultSender) -> Self {
      Self {
         callback_id: callback_id.into(),
         sink,
         finished: AtomicBool::new(false),
      }
   }

   pub fn callback_id(&self) -> &SmolStr {
      &self.callback_id
   }

   pub fn is_finished(&self) -> bool {
      self.finished.load(Ordering::Acquire)
   }

   /// Sends `result` to the host, returning whether it was delivered.
   pub fn send_plugin_result(&self, result: PluginResult) -> bool {
      let already_finished = if result.keep_callback() {
         self.is_finished()
      } else {
         self.finished.swap(true, Ordering::AcqRel)
      };
      if already_finished {
         warn!(
            "Attempted to send a result on finished callback {}: {} {}",
            self.callback_id,
            result.status(),
            result.message()
         );
         return false;
      }

      self.sink.deliver(&self.callback_id, result);
      true
   }
}

impl std::fmt::Debug for CallbackContext {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("CallbackContext")
         .field("callback_id", &self.callback_id)
         .field("finished", &self.is_finished())
         .finish_non_exhaustive()
   }
}
