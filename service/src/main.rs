//! Muzik connection-state relay for D-Bus
//!
//! This service watches a Muzik headphone through BlueZ and relays every
//! connection-state change to the most recently registered D-Bus callback
//! as a `PluginResult` signal.

use std::{sync::Arc, time::Duration};

use crossbeam::queue::SegQueue;
use log::{debug, info, warn};
use smol_str::SmolStr;
use tokio::{signal, sync::Notify, time};
use zbus::{Connection, connection, object_server::InterfaceRef};

use accessory::bluez::BluezAccessory;
use dbus::RelayService;
use plugin::{PluginResult, ResultSink};
use relay::ConnectionStateRelay;

mod accessory;
mod config;
mod dbus;
mod error;
mod plugin;
mod relay;

use crate::{dbus::RelayServiceSignals, error::Result};

#[tokio::main]
async fn main() -> Result<()> {
   env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

   info!("Starting mzrelayd...");

   let config = config::Config::load()?;

   let session = bluer::Session::new().await?;
   let accessory = Arc::new(BluezAccessory::open(&session, &config).await?);
   info!(
      "Watching accessory {} ({})",
      accessory.name(),
      accessory.address()
   );

   // Results are queued here and emitted as D-Bus signals in order
   let dispatcher = ResultDispatcher::new();

   let relay = ConnectionStateRelay::new(accessory);
   let service = RelayService::new(relay, dispatcher.clone());

   let connection = connection::Builder::session()?
      .name(config.bus_name.as_str())?
      .serve_at(config.object_path.as_str(), service)?
      .build()
      .await?;

   info!(
      "mzrelayd D-Bus service started at {} {}",
      config.bus_name, config.object_path
   );

   dispatcher
      .spawn_dispatcher(connection, &config.object_path)
      .await?;

   signal::ctrl_c().await?;
   info!("Shutting down mzrelayd...");

   Ok(())
}

struct ResultDispatcher {
   queue: SegQueue<(SmolStr, PluginResult)>,
   notifier: Notify,
}

impl ResultDispatcher {
   fn new() -> Arc<Self> {
      Arc::new(Self {
         queue: SegQueue::new(),
         notifier: Notify::new(),
      })
   }
}

impl ResultDispatcher {
   async fn recv(self: &Arc<Self>) -> Option<(SmolStr, PluginResult)> {
      loop {
         if let Some(item) = self.queue.pop() {
            return Some(item);
         }
         let notify = self.notifier.notified();
         if let Some(item) = self.queue.pop() {
            return Some(item);
         }
         if Arc::strong_count(self) == 1 {
            return None;
         }
         let _ = time::timeout(Duration::from_secs(1), notify).await;
      }
   }

   /// Emits queued results in FIFO order until every other handle to the
   /// dispatcher is gone. A failed emission is logged and skipped.
   async fn run<F, Fut>(self: Arc<Self>, mut emit: F)
   where
      F: FnMut(SmolStr, PluginResult) -> Fut,
      Fut: Future<Output = Result<()>>,
   {
      while let Some((callback_id, result)) = self.recv().await {
         if let Err(e) = emit(callback_id, result).await {
            warn!("Error dispatching plugin result: {e}");
         }
      }
   }

   async fn emit(
      iface: &InterfaceRef<RelayService>,
      callback_id: SmolStr,
      result: PluginResult,
   ) -> Result<()> {
      debug!(
         "Emitting {} {} for {callback_id}",
         result.status(),
         result.message()
      );
      iface
         .plugin_result(
            &callback_id,
            result.status().to_str(),
            result.message(),
            result.keep_callback(),
         )
         .await?;
      Ok(())
   }

   async fn spawn_dispatcher(self: Arc<Self>, connection: Connection, path: &str) -> Result<()> {
      let iface = connection
         .object_server()
         .interface::<_, RelayService>(path)
         .await?;
      tokio::spawn(self.run(move |callback_id, result| {
         let iface = iface.clone();
         async move { Self::emit(&iface, callback_id, result).await }
      }));

      Ok(())
   }
}

impl ResultSink for ResultDispatcher {
   fn deliver(&self, callback_id: &SmolStr, result: PluginResult) {
      self.queue.push((callback_id.clone(), result));
      self.notifier.notify_waiters();
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::{error::RelayError, plugin::Status};

   fn result(message: &str) -> PluginResult {
      let mut result = PluginResult::new(Status::Ok, message);
      result.set_keep_callback(true);
      result
   }

   #[tokio::test]
   async fn test_results_are_emitted_in_order() {
      let dispatcher = ResultDispatcher::new();
      dispatcher.deliver(&SmolStr::new_static("A"), result("CONNECTING"));
      dispatcher.deliver(&SmolStr::new_static("A"), result("CONNECTED"));
      dispatcher.deliver(&SmolStr::new_static("B"), result("DISCONNECTED"));

      let mut emitted = Vec::new();
      while emitted.len() < 3 {
         let (id, result) = dispatcher.recv().await.unwrap();
         emitted.push((id.to_string(), result.message().to_string()));
      }

      assert_eq!(
         emitted,
         [
            ("A".to_string(), "CONNECTING".to_string()),
            ("A".to_string(), "CONNECTED".to_string()),
            ("B".to_string(), "DISCONNECTED".to_string()),
         ]
      );
   }

   #[tokio::test]
   async fn test_failed_emit_does_not_stop_dispatcher() {
      let dispatcher = ResultDispatcher::new();
      for message in ["CONNECTING", "CONNECTED", "DISCONNECTED"] {
         dispatcher.deliver(&SmolStr::new_static("A"), result(message));
      }

      let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
      let recorded = seen.clone();
      // The dispatcher holds the only handle, so `run` ends once drained.
      dispatcher
         .run(move |_, result| {
            let recorded = recorded.clone();
            async move {
               let mut seen = recorded.lock();
               seen.push(result.message().to_string());
               if seen.len() == 1 {
                  return Err(RelayError::Io(std::io::Error::other("bus gone")));
               }
               Ok(())
            }
         })
         .await;

      assert_eq!(*seen.lock(), ["CONNECTING", "CONNECTED", "DISCONNECTED"]);
   }

   #[tokio::test]
   async fn test_recv_wakes_on_delivery() {
      let dispatcher = ResultDispatcher::new();
      let sender = dispatcher.clone();
      let waiter = tokio::spawn(async move { dispatcher.recv().await });

      tokio::task::yield_now().await;
      sender.deliver(&SmolStr::new_static("A"), result("CONNECTED"));

      let (id, result) = waiter.await.unwrap().unwrap();
      assert_eq!(id, "A");
      assert_eq!(result.message(), "CONNECTED");
   }
}
