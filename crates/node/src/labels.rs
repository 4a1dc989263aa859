//! Helpful types for node keys, input names and stream names

use serde::{Deserialize, Serialize};
use smartstring::{LazyCompact, SmartString};
use std::{borrow::Borrow, fmt::Display};

macro_rules! label {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Debug, Hash, PartialEq, Eq, Clone, Serialize, Deserialize, PartialOrd, Ord)]
		pub struct $name(SmartString<LazyCompact>);

		impl $name {
			pub fn new(s: &str) -> Self {
				Self(s.into())
			}

			pub fn as_str(&self) -> &str {
				&self.0
			}
		}

		impl Display for $name {
			fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
				self.0.fmt(f)
			}
		}

		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}

		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}

		impl From<&str> for $name {
			fn from(s: &str) -> Self {
				Self(s.into())
			}
		}

		impl From<String> for $name {
			fn from(s: String) -> Self {
				Self(s.into())
			}
		}

		impl From<SmartString<LazyCompact>> for $name {
			fn from(s: SmartString<LazyCompact>) -> Self {
				Self(s)
			}
		}

		impl From<$name> for SmartString<LazyCompact> {
			fn from(value: $name) -> Self {
				value.0
			}
		}

		impl<'a> From<&'a $name> for &'a str {
			fn from(value: &'a $name) -> Self {
				&value.0
			}
		}
	};
}

label!(
	/// The content address of a node.
	/// Two nodes with equal keys compute the same artifact.
	NodeKey
);

label!(
	/// The name of one of a node's inputs
	InputName
);

label!(
	/// The name of one of a node's output streams.
	/// A node's default stream has no name.
	StreamName
);
