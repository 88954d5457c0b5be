//! Configuration management for the relay service.
//!
//! This module handles loading and saving configuration from disk,
//! including which adapter and accessory to watch and where to publish
//! the D-Bus interface.

use std::{
   env, fs,
   path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

/// Main configuration structure for the service.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
   /// Adapter name such as `hci0`; the default adapter when unset.
   #[serde(default)]
   pub adapter: Option<String>,

   /// Address of the accessory to watch; discovered when unset.
   #[serde(default)]
   pub device_address: Option<String>,

   #[serde(default)]
   pub known_devices: Vec<KnownDevice>,

   #[serde(default = "default_name_patterns")]
   pub name_patterns: Vec<String>,

   #[serde(default = "default_bus_name")]
   pub bus_name: String,

   #[serde(default = "default_object_path")]
   pub object_path: String,
}

/// Represents a known Muzik accessory.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct KnownDevice {
   pub address: String,
   pub name: String,
}

fn default_name_patterns() -> Vec<String> {
   vec!["muzik".to_string()]
}

fn default_bus_name() -> String {
   "org.mzrelay".to_string()
}

fn default_object_path() -> String {
   "/org/mzrelay/accessory".to_string()
}

impl Default for Config {
   fn default() -> Self {
      Self {
         adapter: None,
         device_address: None,
         known_devices: vec![],
         name_patterns: default_name_patterns(),
         bus_name: default_bus_name(),
         object_path: default_object_path(),
      }
   }
}

impl Config {
   /// Loads configuration from disk or creates default if not exists.
   pub fn load() -> Result<Self> {
      Self::load_from(&Self::config_path()?)
   }

   /// Loads configuration from `path`, writing the defaults there if the
   /// file does not exist yet.
   pub fn load_from(path: &Path) -> Result<Self> {
      if path.exists() {
         let contents = fs::read_to_string(path)?;
         Ok(toml::from_str(&contents)?)
      } else {
         let config = Self::default();
         config.save_to(path)?;
         Ok(config)
      }
   }

   /// Saves the configuration to `path`, creating parent directories.
   pub fn save_to(&self, path: &Path) -> Result<()> {
      if let Some(parent) = path.parent() {
         fs::create_dir_all(parent)?;
      }

      let contents = toml::to_string_pretty(self)?;
      fs::write(path, contents)?;

      Ok(())
   }

   fn config_path() -> Result<PathBuf> {
      let config_dir = if let Ok(home) = env::var("MZRELAY_HOME") {
         PathBuf::from(home)
      } else if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
         PathBuf::from(config_home)
      } else {
         dirs::config_dir().ok_or(RelayError::ConfigDirNotFound)?
      };

      Ok(config_dir.join("mzrelayd").join("config.toml"))
   }

   /// Checks if the given address is a known device and returns its name.
   pub fn is_known_device(&self, address: &str) -> Option<&str> {
      self
         .known_devices
         .iter()
         .find(|d| d.address.eq_ignore_ascii_case(address))
         .map(|d| d.name.as_str())
   }
}
