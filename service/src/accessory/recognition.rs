//! Device recognition logic for Muzik headphones.
//!
//! A device is accepted when its address is a configured known device, or
//! when its name or alias contains one of the configured patterns.

use crate::config::Config;

/// Returns the first pattern contained in `name`, ignoring ASCII case.
pub fn match_name_pattern<'a>(name: &str, patterns: &'a [String]) -> Option<&'a str> {
   let name = name.to_ascii_lowercase();
   patterns
      .iter()
      .map(String::as_str)
      .filter(|p| !p.is_empty())
      .find(|p| name.contains(&p.to_ascii_lowercase()))
}

pub async fn is_muzik_device(dev: &bluer::Device, config: &Config) -> bool {
   let addr = dev.address().to_string();
   if let Some(name) = config.is_known_device(&addr) {
      log::debug!("Muzik accessory recognised as known device: {name} ({addr})");
      return true;
   }

   if let Ok(Some(name)) = dev.name().await
      && let Some(pattern) = match_name_pattern(&name, &config.name_patterns)
   {
      log::debug!("Muzik accessory recognised via name pattern: {name} => {pattern}");
      return true;
   }
   if let Ok(alias) = dev.alias().await
      && let Some(pattern) = match_name_pattern(&alias, &config.name_patterns)
   {
      log::debug!("Muzik accessory recognised via alias pattern: {alias} => {pattern}");
      return true;
   }
   false
}
