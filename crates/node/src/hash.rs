//! Content addresses for nodes.
//!
//! A node's identity is derived from the keys of its input specs.
//! Keys are rendered to a canonical text, sorted, and hashed, so the
//! order in which inputs were declared never changes the result.

use data_encoding::BASE32;
use itertools::Itertools;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::Display;

use crate::{
	labels::{InputName, NodeKey, StreamName},
	spec::InputSpec,
};

/// Number of padding characters a base-32 encoded sha256 digest ends with
const DIGEST_PADDING: usize = 4;

/// Identifies one output stream of one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamKey {
	pub node: NodeKey,
	pub stream: Option<StreamName>,
}

impl Display for StreamKey {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match &self.stream {
			None => write!(f, "({},)", quote(self.node.as_str())),
			Some(s) => write!(f, "({}, {})", quote(self.node.as_str()), quote(s.as_str())),
		}
	}
}

/// The part of a [`SpecKey`] that identifies an input's value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKey {
	None,
	Plain(Value),
	Stream(StreamKey),
}

impl Display for ValueKey {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::None => write!(f, "None"),
			Self::Plain(v) => {
				let mut out = String::new();
				canonical_json(v, &mut out);
				write!(f, "{out}")
			}
			Self::Stream(s) => s.fmt(f),
		}
	}
}

/// `(name, value, foreach)`.
/// Specs with equal keys are equivalent for identity purposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecKey {
	pub name: InputName,
	pub value: ValueKey,
	pub foreach: bool,
}

impl Display for SpecKey {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"({}, {}, {})",
			quote(self.name.as_str()),
			self.value,
			if self.foreach { "True" } else { "False" }
		)
	}
}

fn quote(s: &str) -> String {
	format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Compact json with object keys sorted.
/// Key order must not depend on serde_json's map features.
fn canonical_json(value: &Value, out: &mut String) {
	match value {
		Value::Array(items) => {
			out.push('[');
			for (i, x) in items.iter().enumerate() {
				if i != 0 {
					out.push(',');
				}
				canonical_json(x, out);
			}
			out.push(']');
		}

		Value::Object(map) => {
			out.push('{');
			for (i, (k, v)) in map.iter().sorted_by(|a, b| a.0.cmp(b.0)).enumerate() {
				if i != 0 {
					out.push(',');
				}
				out.push_str(&Value::from(k.as_str()).to_string());
				out.push(':');
				canonical_json(v, out);
			}
			out.push('}');
		}

		x => out.push_str(&x.to_string()),
	}
}

/// Render already-canonical items as a tuple
fn tuple_repr(items: &[String]) -> String {
	match items {
		[] => "()".into(),
		[one] => format!("({one},)"),
		many => format!("({})", many.join(", ")),
	}
}

/// Compute the content address of a set of input specs.
///
/// The result is 52 lower-case base-32 characters and does not
/// depend on the order of `specs`.
pub fn genhash<'a>(specs: impl IntoIterator<Item = &'a InputSpec>) -> String {
	let mut keys = specs
		.into_iter()
		.map(|x| x.key().to_string())
		.collect::<Vec<_>>();
	keys.sort();

	let digest = Sha256::digest(tuple_repr(&keys).as_bytes());
	let mut hash = BASE32.encode(&digest).to_lowercase();
	hash.truncate(hash.len().saturating_sub(DIGEST_PADDING));
	return hash;
}
