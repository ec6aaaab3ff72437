use voucher_recipe::{AttrKey, RecipeError};

/// Failure status reported by an attribute manager callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ManagerError {
	/// The manager rejected the command or its content.
	#[error("invalid argument")]
	InvalidArgument,
	/// The manager does not implement the requested operation.
	#[error("operation not supported")]
	NotSupported,
	/// The value is still granted elsewhere and was not released.
	#[error("value still in use")]
	InUse,
	/// The manager could not allocate what it needed.
	#[error("resource shortage")]
	ResourceShortage,
	/// Any other manager-defined status code.
	#[error("manager failure (status {0})")]
	Failure(u32),
}

/// Errors returned by voucher operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VoucherError {
	/// Unknown or unregistered key, out-of-range key, or malformed recipe.
	#[error("invalid argument: {0}")]
	InvalidArgument(String),
	/// Missing or mismatched authorization, or an unresolvable voucher name.
	#[error("invalid capability: {0}")]
	InvalidCapability(String),
	/// The output buffer cannot hold the extracted bytes.
	#[error("no space: need {needed} bytes, have {available}")]
	NoSpace { needed: usize, available: usize },
	/// An attribute manager callback failed.
	#[error("manager for key {key} failed: {source}")]
	Manager {
		key: AttrKey,
		#[source]
		source: ManagerError,
	},
}

impl VoucherError {
	pub(crate) fn invalid_key(key: AttrKey) -> Self {
		Self::InvalidArgument(format!("key {key} is not a valid attribute key"))
	}

	pub(crate) fn unregistered(key: AttrKey) -> Self {
		Self::InvalidArgument(format!("no manager registered for key {key}"))
	}

	pub(crate) fn manager(key: AttrKey) -> impl FnOnce(ManagerError) -> Self {
		move |source| Self::Manager { key, source }
	}
}

impl From<RecipeError> for VoucherError {
	fn from(err: RecipeError) -> Self {
		match err {
			RecipeError::NoSpace { needed, available } => Self::NoSpace { needed, available },
			other => Self::InvalidArgument(other.to_string()),
		}
	}
}

/// Manager registration failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
	#[error("key {0} cannot carry a manager")]
	InvalidKey(AttrKey),
	#[error("key {0} already has a manager")]
	AlreadyRegistered(AttrKey),
}

/// Invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to parse config: {0}")]
	Parse(String),
	#[error("{field} must be a power of two, got {value}")]
	NotPowerOfTwo { field: &'static str, value: u32 },
	#[error("initial_table_size must be at least 2, got {0}")]
	TooSmall(u32),
	#[error("max_table_size {max} is below initial_table_size {initial}")]
	MaxBelowInitial { initial: u32, max: u32 },
}

pub type Result<T, E = VoucherError> = std::result::Result<T, E>;
