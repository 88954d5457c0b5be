//! Plugin result values.

use smol_str::SmolStr;

/// Outcome code carried by every plugin result.
///
/// Discriminants match the result-channel status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Status {
   Ok = 1,
   Error = 9,
}

impl Status {
   pub fn to_str(self) -> &'static str {
      self.into()
   }
}

/// A single message sent back through a callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginResult {
   status: Status,
   message: SmolStr,
   keep_callback: bool,
}

impl PluginResult {
   /// Creates a result that finishes its callback unless told otherwise.
   pub fn new(status: Status, message: impl Into<SmolStr>) -> Self {
      Self {
         status,
         message: message.into(),
         keep_callback: false,
      }
   }

   /// Marks whether the callback stays open for further results.
   pub fn set_keep_callback(&mut self, keep: bool) {
      self.keep_callback = keep;
   }

   pub fn status(&self) -> Status {
      self.status
   }

   pub fn message(&self) -> &str {
      &self.message
   }

   pub fn keep_callback(&self) -> bool {
      self.keep_callback
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_status_codes_and_names() {
      assert_eq!(Status::Ok as u8, 1);
      assert_eq!(Status::Error as u8, 9);
      assert_eq!(Status::Ok.to_str(), "OK");
      assert_eq!(Status::Error.to_string(), "ERROR");
   }

   #[test]
   fn test_keep_callback_defaults_off() {
      let mut result = PluginResult::new(Status::Ok, "CONNECTED");
      assert!(!result.keep_callback());
      assert_eq!(result.message(), "CONNECTED");
      assert_eq!(result.status(), Status::Ok);

      result.set_keep_callback(true);
      assert!(result.keep_callback());
   }
}
