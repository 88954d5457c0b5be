use std::sync::Arc;

use log::info;
use smol_str::SmolStr;
use zbus::{interface, object_server::SignalEmitter};

use crate::{
   accessory::{Accessory, ConnectionState, bluez::BluezAccessory},
   plugin::{CallbackContext, ResultSender},
   relay::ConnectionStateRelay,
};

pub struct RelayService {
   relay: Arc<ConnectionStateRelay<BluezAccessory>>,
   sink: ResultSender,
}

impl RelayService {
   pub fn new(relay: Arc<ConnectionStateRelay<BluezAccessory>>, sink: ResultSender) -> Self {
      Self { relay, sink }
   }
}

/// Registers `callback_id` on `relay`, mapping failures to D-Bus errors.
fn register_callback<A: Accessory + ?Sized + 'static>(
   relay: &ConnectionStateRelay<A>,
   callback_id: &str,
   sink: ResultSender,
) -> zbus::fdo::Result<SmolStr> {
   let callback_id = callback_id.trim();
   if callback_id.is_empty() {
      return Err(zbus::fdo::Error::InvalidArgs(
         "Callback id must not be empty".into(),
      ));
   }

   relay
      .register(CallbackContext::new(callback_id, sink))
      .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
   Ok(callback_id.into())
}

#[interface(name = "org.mzrelay.ConnectionState")]
impl RelayService {
   async fn register_for_connection_state(&self, callback_id: String) -> zbus::fdo::Result<()> {
      let callback_id = register_callback(&*self.relay, &callback_id, self.sink.clone())?;
      info!("D-Bus client registered callback {callback_id}");
      Ok(())
   }

   async fn get_accessory(&self) -> zbus::fdo::Result<String> {
      let info = self.relay.accessory().info().await;
      serde_json::to_string(&info).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
   }

   async fn request_is_device_connected(&self) -> bool {
      self.relay.accessory().state() == ConnectionState::Connected
   }

   async fn request_battery_level_percent(&self) -> zbus::fdo::Result<u8> {
      self
         .relay
         .accessory()
         .battery_percentage()
         .await
         .ok_or_else(|| zbus::fdo::Error::NotSupported("Battery level not reported".into()))
   }

   async fn request_local_name(&self) -> zbus::fdo::Result<String> {
      self
         .relay
         .accessory()
         .local_name()
         .await
         .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
   }

   // Signals
   #[zbus(signal)]
   pub async fn plugin_result(
      emitter: &SignalEmitter<'_>,
      callback_id: &str,
      status: &str,
      message: &str,
      keep_callback: bool,
   ) -> zbus::Result<()>;

   // Properties
   #[zbus(property)]
   async fn accessory_address(&self) -> String {
      self.relay.accessory().address().to_string()
   }

   #[zbus(property)]
   async fn accessory_state(&self) -> String {
      self.relay.accessory().state().name().to_string()
   }
}

#[cfg(test)]
mod tests {
   use std::sync::{
      Weak,
      atomic::{AtomicBool, Ordering},
   };

   use super::*;
   use crate::{
      accessory::{ConnectionStateCallback, SubscriberSlot},
      error::{RelayError, Result},
      plugin::{PluginResult, ResultSink},
   };

   #[derive(Default)]
   struct FakeAccessory {
      slot: SubscriberSlot,
      offline: AtomicBool,
   }

   impl Accessory for FakeAccessory {
      fn register_for_connection_state(
         &self,
         callback: Weak<dyn ConnectionStateCallback>,
      ) -> Result<()> {
         if self.offline.load(Ordering::Relaxed) {
            return Err(RelayError::SubscriptionFailed("accessory offline".into()));
         }
         self.slot.replace(callback);
         Ok(())
      }
   }

   #[derive(Default)]
   struct Recorder(parking_lot::Mutex<Vec<(SmolStr, PluginResult)>>);

   impl ResultSink for Recorder {
      fn deliver(&self, callback_id: &SmolStr, result: PluginResult) {
         self.0.lock().push((callback_id.clone(), result));
      }
   }

   fn setup() -> (
      Arc<FakeAccessory>,
      Arc<ConnectionStateRelay<FakeAccessory>>,
      Arc<Recorder>,
   ) {
      let accessory = Arc::new(FakeAccessory::default());
      let relay = ConnectionStateRelay::new(accessory.clone());
      (accessory, relay, Arc::new(Recorder::default()))
   }

   #[test]
   fn test_register_trims_callback_id() {
      let (accessory, relay, sink) = setup();

      let id = register_callback(&*relay, "  cb-7 ", sink.clone()).unwrap();
      assert_eq!(id, "cb-7");

      accessory.slot.notify(ConnectionState::Connected);
      let delivered = sink.0.lock();
      assert_eq!(delivered.len(), 1);
      assert_eq!(delivered[0].0, "cb-7");
      assert_eq!(delivered[0].1.message(), "CONNECTED");
   }

   #[test]
   fn test_empty_callback_id_is_invalid_args() {
      let (accessory, relay, sink) = setup();

      for id in ["", "   "] {
         let err = register_callback(&*relay, id, sink.clone()).unwrap_err();
         assert!(matches!(err, zbus::fdo::Error::InvalidArgs(_)), "{err:?}");
      }

      // Nothing was registered, so the accessory has no subscriber.
      assert!(!accessory.slot.notify(ConnectionState::Connected));
      assert!(sink.0.lock().is_empty());
   }

   #[test]
   fn test_relay_error_is_failed() {
      let (accessory, relay, sink) = setup();
      accessory.offline.store(true, Ordering::Relaxed);

      let err = register_callback(&*relay, "cb-1", sink).unwrap_err();
      match err {
         zbus::fdo::Error::Failed(msg) => assert!(msg.contains("accessory offline"), "{msg}"),
         other => panic!("unexpected error: {other:?}"),
      }
   }
}
