//! BlueZ-backed Muzik accessory.
//!
//! The accessory watches the device's `Connected` and `ServicesResolved`
//! properties and turns their changes into [`ConnectionState`] callbacks.
//! It also answers the read-only queries BlueZ can serve directly: battery
//! level, local name and vendor/product ids.

use std::{
   future::{self, Future},
   str::FromStr,
   sync::{Arc, Weak},
};

use bluer::{Adapter, Address, DeviceEvent, DeviceProperty, Session};
use crossbeam::atomic::AtomicCell;
use futures::{StreamExt, stream::BoxStream};
use log::{debug, info, warn};
use serde::Serialize;
use smol_str::SmolStr;
use tokio::{sync::oneshot, task::JoinHandle};

use crate::{
   accessory::{
      Accessory, ConnectionState, ConnectionStateCallback, SubscriberSlot, recognition,
   },
   config::Config,
   error::{RelayError, Result},
};

/// A change of one of the link flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkChange {
   Connected(bool),
   ServicesResolved(bool),
}

impl LinkChange {
   fn from_event(event: DeviceEvent) -> Option<Self> {
      match event {
         DeviceEvent::PropertyChanged(DeviceProperty::Connected(connected)) => {
            Some(Self::Connected(connected))
         },
         DeviceEvent::PropertyChanged(DeviceProperty::ServicesResolved(resolved)) => {
            Some(Self::ServicesResolved(resolved))
         },
         _ => None,
      }
   }
}

/// Source of link flags and their changes.
trait LinkDevice: Send + Sync {
   fn link_events(&self) -> impl Future<Output = Result<BoxStream<'_, LinkChange>>> + Send;

   /// Current `(connected, services_resolved)` flags.
   fn link_flags(&self) -> impl Future<Output = Result<(bool, bool)>> + Send;
}

impl LinkDevice for bluer::Device {
   async fn link_events(&self) -> Result<BoxStream<'_, LinkChange>> {
      let events = self.events().await?;
      Ok(events
         .filter_map(|event| future::ready(LinkChange::from_event(event)))
         .boxed())
   }

   async fn link_flags(&self) -> Result<(bool, bool)> {
      Ok((self.is_connected().await?, self.is_services_resolved().await?))
   }
}

/// Tracks the link flags of a device and reports state transitions.
#[derive(Debug, Clone, Copy)]
struct LinkTracker {
   connected: bool,
   services_resolved: bool,
   last: ConnectionState,
}

impl LinkTracker {
   const fn new(connected: bool, services_resolved: bool) -> Self {
      Self {
         connected,
         services_resolved,
         last: ConnectionState::from_link(connected, services_resolved),
      }
   }

   const fn state(&self) -> ConnectionState {
      self.last
   }

   fn apply(&mut self, change: LinkChange) -> Option<ConnectionState> {
      match change {
         LinkChange::Connected(connected) => self.set_connected(connected),
         LinkChange::ServicesResolved(resolved) => self.set_services_resolved(resolved),
      }
   }

   fn set_connected(&mut self, connected: bool) -> Option<ConnectionState> {
      self.connected = connected;
      if !connected {
         self.services_resolved = false;
      }
      self.transition(ConnectionState::from_link(connected, self.services_resolved))
   }

   fn set_services_resolved(&mut self, resolved: bool) -> Option<ConnectionState> {
      self.services_resolved = resolved;
      // Services go away just before the link drops; wait for `Connected`.
      if resolved && self.connected {
         self.transition(ConnectionState::Connected)
      } else {
         None
      }
   }

   fn transition(&mut self, next: ConnectionState) -> Option<ConnectionState> {
      if next == self.last {
         return None;
      }
      self.last = next;
      Some(next)
   }
}

/// Snapshot of the accessory as reported by BlueZ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessoryInfo {
   pub address: String,
   pub name: SmolStr,
   pub local_name: Option<String>,
   pub state: ConnectionState,
   pub battery_percent: Option<u8>,
   pub vendor_id: Option<u32>,
   pub product_id: Option<u32>,
}

/// A Muzik accessory reached through BlueZ.
pub struct BluezAccessory {
   device: bluer::Device,
   name: SmolStr,
   subscriber: Arc<SubscriberSlot>,
   state: Arc<AtomicCell<ConnectionState>>,
   monitor: JoinHandle<()>,
}

impl BluezAccessory {
   /// Locates the configured accessory and starts watching its link state.
   ///
   /// Returns once the monitor has subscribed to property changes and read
   /// the initial link flags.
   pub async fn open(session: &Session, config: &Config) -> Result<Self> {
      let adapter = match &config.adapter {
         Some(name) => session
            .adapter(name)
            .map_err(|_| RelayError::AdapterNotFound(name.clone()))?,
         None => session.default_adapter().await?,
      };
      info!("Using adapter: {}", adapter.name());

      let device = match &config.device_address {
         Some(address) => {
            let address = Address::from_str(address)?;
            if !adapter.device_addresses().await?.contains(&address) {
               return Err(RelayError::DeviceNotFound(address));
            }
            adapter.device(address)?
         },
         None => find_accessory(&adapter, config).await?,
      };

      let address = device.address();
      let name: SmolStr = device
         .name()
         .await
         .ok()
         .flatten()
         .unwrap_or_else(|| address.to_string())
         .into();

      let subscriber = Arc::new(SubscriberSlot::new());
      let state = Arc::new(AtomicCell::new(ConnectionState::Disconnected));
      let (ready_tx, ready_rx) = oneshot::channel();
      let monitor = tokio::spawn(monitor_link(
         device.clone(),
         address,
         ready_tx,
         subscriber.clone(),
         state.clone(),
      ));
      ready_rx.await.map_err(|_| {
         RelayError::SubscriptionFailed(format!("monitor for {address} exited early"))
      })??;
      info!("Accessory {name} ({address}) is {}", state.load());

      Ok(Self {
         device,
         name,
         subscriber,
         state,
         monitor,
      })
   }

   pub fn address(&self) -> Address {
      self.device.address()
   }

   pub fn name(&self) -> &SmolStr {
      &self.name
   }

   /// Last link state observed on the device.
   pub fn state(&self) -> ConnectionState {
      self.state.load()
   }

   /// Battery level, when the device exposes the BlueZ battery interface.
   pub async fn battery_percentage(&self) -> Option<u8> {
      self.device.battery_percentage().await.ok().flatten()
   }

   /// Local Bluetooth name (the BlueZ alias).
   pub async fn local_name(&self) -> Result<String> {
      Ok(self.device.alias().await?)
   }

   pub async fn info(&self) -> AccessoryInfo {
      let modalias = self.device.modalias().await.ok().flatten();
      AccessoryInfo {
         address: self.address().to_string(),
         name: self.name.clone(),
         local_name: self.local_name().await.ok(),
         state: self.state(),
         battery_percent: self.battery_percentage().await,
         vendor_id: modalias.as_ref().map(|m| m.vendor),
         product_id: modalias.as_ref().map(|m| m.product),
      }
   }
}

impl Accessory for BluezAccessory {
   fn register_for_connection_state(
      &self,
      callback: Weak<dyn ConnectionStateCallback>,
   ) -> Result<()> {
      if self.monitor.is_finished() {
         return Err(RelayError::SubscriptionFailed(format!(
            "event stream for {} has ended",
            self.address()
         )));
      }
      self.subscriber.replace(callback);
      Ok(())
   }
}

impl Drop for BluezAccessory {
   fn drop(&mut self) {
      self.monitor.abort();
   }
}

async fn find_accessory(adapter: &Adapter, config: &Config) -> Result<bluer::Device> {
   for addr in adapter.device_addresses().await? {
      let Ok(device) = adapter.device(addr) else {
         continue;
      };
      if device.is_paired().await.unwrap_or(false)
         && recognition::is_muzik_device(&device, config).await
      {
         return Ok(device);
      }
   }
   Err(RelayError::NoAccessory(adapter.name().to_string()))
}

/// Subscribes to link changes, then reads the initial flags, so nothing that
/// happens in between is lost. `ready` receives the outcome of both steps.
async fn monitor_link(
   device: impl LinkDevice,
   address: Address,
   ready: oneshot::Sender<Result<()>>,
   subscriber: Arc<SubscriberSlot>,
   state: Arc<AtomicCell<ConnectionState>>,
) {
   let mut events = match device.link_events().await {
      Ok(events) => events,
      Err(e) => {
         warn!("Failed to get device events for {address}: {e}");
         let _ = ready.send(Err(e));
         return;
      },
   };
   let mut tracker = match device.link_flags().await {
      Ok((connected, resolved)) => LinkTracker::new(connected, resolved),
      Err(e) => {
         warn!("Failed to read link state of {address}: {e}");
         let _ = ready.send(Err(e));
         return;
      },
   };
   state.store(tracker.state());
   if ready.send(Ok(())).is_err() {
      return;
   }

   while let Some(change) = events.next().await {
      let Some(next) = tracker.apply(change) else {
         continue;
      };

      state.store(next);
      info!("Accessory {address} is {next}");
      if !subscriber.notify(next) {
         debug!("No subscriber for {address}, dropping {next}");
      }
   }

   warn!("Event stream for {address} ended");
   subscriber.notify_lost(&format!("Event stream for {address} ended"));
}
