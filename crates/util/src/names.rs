//! Node and input name checks
use thiserror::Error;

/// Characters with a meaning in node keys and stream paths.
/// `:` joins a namespace and a name, `/` selects a stream.
const RESERVED: [char; 2] = [':', '/'];

/// The ways a name may be invalid
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NameError {
	#[error("name cannot be empty")]
	Empty,

	#[error("name cannot be entirely whitespace")]
	IsWhitespace,

	/// This name has leading or trailing whitespace
	#[error("name cannot have leading or trailing whitespace")]
	TrimWhitespace,

	#[error("name cannot contain `{c}`")]
	Reserved { c: char },

	/// Names end up in log lines, keep them printable
	#[error("name cannot contain control characters")]
	Control,
}

/// Make sure `name` can be used as a node or input name
pub fn check_name(name: &str) -> Result<(), NameError> {
	if name.is_empty() {
		return Err(NameError::Empty);
	}

	let trimmed = name.trim();
	if trimmed.is_empty() {
		return Err(NameError::IsWhitespace);
	}

	if trimmed.len() != name.len() {
		return Err(NameError::TrimWhitespace);
	}

	if let Some(c) = name.chars().find(|c| RESERVED.contains(c)) {
		return Err(NameError::Reserved { c });
	}

	if name.chars().any(char::is_control) {
		return Err(NameError::Control);
	}

	return Ok(());
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn accepts_plain_names() {
		assert_eq!(check_name("bagmeta"), Ok(()));
		assert_eq!(check_name("gnss positions"), Ok(()));
		assert_eq!(check_name("in-2.b"), Ok(()));
	}

	#[test]
	fn rejects_bad_names() {
		assert_eq!(check_name(""), Err(NameError::Empty));
		assert_eq!(check_name("   "), Err(NameError::IsWhitespace));
		assert_eq!(check_name(" topic"), Err(NameError::TrimWhitespace));
		assert_eq!(check_name("topic\t"), Err(NameError::TrimWhitespace));
		assert_eq!(check_name("ns:topic"), Err(NameError::Reserved { c: ':' }));
		assert_eq!(check_name("a/b"), Err(NameError::Reserved { c: '/' }));
		assert_eq!(check_name("a\u{7}b"), Err(NameError::Control));
	}
}
