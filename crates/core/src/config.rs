use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Sizing of the per-key value cache tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VoucherConfig {
	/// Entries allocated when a key is registered. Also fixes the hash bucket count.
	pub initial_table_size: u32,
	/// Hard ceiling on table growth. Reaching it is treated as a leak and aborts.
	pub max_table_size: u32,
}

impl Default for VoucherConfig {
	fn default() -> Self {
		Self {
			initial_table_size: 512,
			max_table_size: 512 * 1024,
		}
	}
}

impl VoucherConfig {
	/// Parses and validates a TOML document. Missing fields take their defaults.
	pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		for (field, value) in [("initial_table_size", self.initial_table_size), ("max_table_size", self.max_table_size)] {
			if !value.is_power_of_two() {
				return Err(ConfigError::NotPowerOfTwo { field, value });
			}
		}
		if self.initial_table_size < 2 {
			return Err(ConfigError::TooSmall(self.initial_table_size));
		}
		if self.max_table_size < self.initial_table_size {
			return Err(ConfigError::MaxBelowInitial {
				initial: self.initial_table_size,
				max: self.max_table_size,
			});
		}
		Ok(())
	}
}
