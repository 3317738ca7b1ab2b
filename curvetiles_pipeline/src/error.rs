use std::fmt::{self, Display};

/// Marker error for cancellation. Not a failure: the scheduler transitions
/// the job to `cancelled` instead of `failed` when it sees this in the chain.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Cancelled;

impl Display for Cancelled {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("operation cancelled")
	}
}

impl std::error::Error for Cancelled {}

/// True when `error` stems from a cancellation token rather than a fault.
pub fn is_cancelled(error: &anyhow::Error) -> bool {
	error.chain().any(|cause| cause.is::<Cancelled>())
}

/// A systemic consistency failure, e.g. a broken projection producing
/// all-zero bounding boxes. Unlike per-item parse errors these are never
/// skipped over.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IntegrityViolation(pub String);

impl Display for IntegrityViolation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "integrity violation: {}", self.0)
	}
}

impl std::error::Error for IntegrityViolation {}

pub fn is_integrity_violation(error: &anyhow::Error) -> bool {
	error.chain().any(|cause| cause.is::<IntegrityViolation>())
}

#[cfg(test)]
mod tests {
	use super::*;
	use anyhow::Context;

	#[test]
	fn detects_cancellation_through_context_chain() {
		let error = anyhow::Error::new(Cancelled).context("upload aborted");
		assert!(is_cancelled(&error));

		let other = anyhow::anyhow!("disk full");
		assert!(!is_cancelled(&other));

		let wrapped: anyhow::Error = Err::<(), _>(anyhow::Error::new(Cancelled))
			.context("phase failed")
			.unwrap_err();
		assert!(is_cancelled(&wrapped));
	}
}
