/// Malformed recipe buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RecipeError {
	/// Fewer bytes remain than a full item header.
	#[error("truncated recipe header at offset {offset}: {remaining} bytes remain")]
	TruncatedHeader { offset: usize, remaining: usize },
	/// The declared content size runs past the end of the buffer.
	#[error("recipe content overrun at offset {offset}: declared {declared} bytes, {remaining} remain")]
	ContentOverrun {
		offset: usize,
		declared: u32,
		remaining: usize,
	},
	/// The output buffer cannot hold the encoded item.
	#[error("recipe output buffer too small: need {needed} bytes, have {available}")]
	NoSpace { needed: usize, available: usize },
}
