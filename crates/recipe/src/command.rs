/// Recipe command codes.
///
/// The core interprets the first few codes itself. Everything else is forwarded to the
/// attribute manager of the item's key as a manager-defined command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecipeCommand {
	/// Copy the previous voucher's value for the key (or every key).
	Copy,
	/// Reset the key (or every key) to its default value.
	Remove,
	/// Install a raw value handle; requires the key's control.
	SetValueHandle,
	/// Manager-side redemption performed when a voucher is received.
	AutoRedeem,
	/// Manager-side preparation performed before a voucher is sent.
	SendPreprocess,
	/// Ask the manager for a value representing the same right as the previous value.
	Redeem,
	/// Manager-defined command.
	Manager(u32),
}

impl RecipeCommand {
	/// Importance manager: take an importance assertion on the caller.
	pub const IMPORTANCE_SELF: Self = Self::Manager(200);
	/// User-data manager: store the content bytes.
	pub const USER_DATA_STORE: Self = Self::Manager(211);

	/// Returns the wire code.
	pub const fn code(self) -> u32 {
		match self {
			Self::Copy => 1,
			Self::Remove => 2,
			Self::SetValueHandle => 3,
			Self::AutoRedeem => 4,
			Self::SendPreprocess => 5,
			Self::Redeem => 10,
			Self::Manager(code) => code,
		}
	}

	/// Decodes a wire code. Unknown codes map to [`RecipeCommand::Manager`].
	pub const fn from_code(code: u32) -> Self {
		match code {
			1 => Self::Copy,
			2 => Self::Remove,
			3 => Self::SetValueHandle,
			4 => Self::AutoRedeem,
			5 => Self::SendPreprocess,
			10 => Self::Redeem,
			other => Self::Manager(other),
		}
	}
}

impl From<u32> for RecipeCommand {
	fn from(code: u32) -> Self {
		Self::from_code(code)
	}
}

impl From<RecipeCommand> for u32 {
	fn from(cmd: RecipeCommand) -> Self {
		cmd.code()
	}
}
