//! Connection states reported by a Muzik accessory.

use serde::{Deserialize, Serialize};

/// Link state of the accessory as seen by the host.
///
/// The SCREAMING_SNAKE_CASE name is the payload delivered to listeners.
#[derive(
   Debug,
   Clone,
   Copy,
   PartialEq,
   Eq,
   Hash,
   Serialize,
   Deserialize,
   strum::Display,
   strum::EnumString,
   strum::IntoStaticStr,
   strum::VariantArray,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
   Connecting,
   Connected,
   Disconnected,
}

impl ConnectionState {
   /// Stable name of the state, e.g. `CONNECTED`.
   pub fn name(self) -> &'static str {
      self.into()
   }

   /// Derives the state from the two BlueZ link flags.
   pub const fn from_link(connected: bool, services_resolved: bool) -> Self {
      match (connected, services_resolved) {
         (false, _) => Self::Disconnected,
         (true, false) => Self::Connecting,
         (true, true) => Self::Connected,
      }
   }
}
