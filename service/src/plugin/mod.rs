//! Plugin result channel.
//!
//! Results are addressed to a callback id and handed to a [`ResultSink`],
//! which forwards them to the host runtime. A callback stays open for as
//! long as the results sent through it ask to keep it.

pub mod callback;
pub mod result;

pub use callback::{CallbackContext, ResultSender, ResultSink};
pub use result::{PluginResult, Status};
