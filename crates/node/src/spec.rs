//! Declarative descriptions of a node's inputs

use serde_json::Value;
use std::{fmt::Display, ops::Index, sync::Arc};

use crate::{
	hash::{SpecKey, StreamKey, ValueKey},
	labels::{InputName, StreamName},
	node::Node,
};

/// A reference to one output stream of another node
#[derive(Debug, Clone)]
pub struct StreamSpec {
	node: Arc<Node>,
	stream: Option<StreamName>,
}

impl StreamSpec {
	/// Reference `node`'s default stream
	pub fn new(node: &Arc<Node>) -> Self {
		Self {
			node: node.clone(),
			stream: None,
		}
	}

	/// Reference the output stream of `node` called `stream`
	pub fn select(node: &Arc<Node>, stream: impl Into<StreamName>) -> Self {
		Self {
			node: node.clone(),
			stream: Some(stream.into()),
		}
	}

	/// The node this stream belongs to
	pub fn node(&self) -> &Arc<Node> {
		&self.node
	}

	/// The name of the stream we reference,
	/// `None` for the node's default stream.
	pub fn stream(&self) -> Option<&StreamName> {
		self.stream.as_ref()
	}

	pub fn key(&self) -> StreamKey {
		StreamKey {
			node: self.node.key().clone(),
			stream: self.stream.clone(),
		}
	}
}

impl Display for StreamSpec {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match &self.stream {
			None => write!(f, "{}", self.node.abbrev()),
			Some(s) => write!(f, "{}/{s}", self.node.abbrev()),
		}
	}
}

/// The value an input is bound to when a node is declared
#[derive(Debug, Clone, Default)]
pub enum SpecValue {
	/// No default, the value must be supplied when the node is invoked
	#[default]
	None,

	/// A plain value
	Plain(Value),

	/// A stream produced by another node
	Stream(StreamSpec),
}

impl SpecValue {
	pub fn key(&self) -> ValueKey {
		match self {
			Self::None => ValueKey::None,
			Self::Plain(v) => ValueKey::Plain(v.clone()),
			Self::Stream(s) => ValueKey::Stream(s.key()),
		}
	}

	pub fn as_stream(&self) -> Option<&StreamSpec> {
		match self {
			Self::Stream(s) => Some(s),
			_ => None,
		}
	}
}

impl From<Value> for SpecValue {
	fn from(value: Value) -> Self {
		Self::Plain(value)
	}
}

impl From<StreamSpec> for SpecValue {
	fn from(value: StreamSpec) -> Self {
		Self::Stream(value)
	}
}

/// A node used as a value refers to its default stream
impl From<&Arc<Node>> for SpecValue {
	fn from(value: &Arc<Node>) -> Self {
		Self::Stream(StreamSpec::new(value))
	}
}

impl From<Arc<Node>> for SpecValue {
	fn from(value: Arc<Node>) -> Self {
		Self::from(&value)
	}
}

/// One named input of a node
#[derive(Debug, Clone)]
pub struct InputSpec {
	name: InputName,
	value: SpecValue,
	foreach: bool,
}

impl InputSpec {
	pub fn new(name: impl Into<InputName>, value: impl Into<SpecValue>, foreach: bool) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
			foreach,
		}
	}

	pub fn name(&self) -> &InputName {
		&self.name
	}

	pub fn value(&self) -> &SpecValue {
		&self.value
	}

	/// If true, this input drives fan-out instead of being bound once
	pub fn is_foreach(&self) -> bool {
		self.foreach
	}

	pub fn key(&self) -> SpecKey {
		SpecKey {
			name: self.name.clone(),
			value: self.value.key(),
			foreach: self.foreach,
		}
	}

	/// Make a copy of this spec bound to another value
	pub fn clone_with(&self, value: impl Into<SpecValue>) -> Self {
		Self {
			name: self.name.clone(),
			value: value.into(),
			foreach: self.foreach,
		}
	}
}

impl Display for InputSpec {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let foreach = if self.foreach { "foreach " } else { "" };
		match &self.value {
			SpecValue::None => write!(f, "<InputSpec {foreach}{}>", self.name),
			SpecValue::Plain(v) => write!(f, "<InputSpec {foreach}{}={v}>", self.name),
			SpecValue::Stream(s) => write!(f, "<InputSpec {foreach}{}={s}>", self.name),
		}
	}
}

/// A node's input specs, in the order they were declared.
///
/// Fan-out follows this order: the first foreach input declared
/// varies slowest. Identity hashing does not depend on it.
#[derive(Debug, Clone, Default)]
pub struct InputSpecs {
	specs: Vec<InputSpec>,
}

impl InputSpecs {
	pub fn new() -> Self {
		Self::default()
	}

	/// Get the spec of the input called `name`
	pub fn get(&self, name: &str) -> Option<&InputSpec> {
		self.specs.iter().find(|x| x.name.as_str() == name)
	}

	pub fn contains(&self, name: &str) -> bool {
		self.get(name).is_some()
	}

	/// Iterate in declaration order
	pub fn iter(&self) -> std::slice::Iter<'_, InputSpec> {
		self.specs.iter()
	}

	pub fn len(&self) -> usize {
		self.specs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.specs.is_empty()
	}

	/// Callers check for name collisions first
	pub(crate) fn push(&mut self, spec: InputSpec) {
		self.specs.push(spec);
	}
}

impl Index<&str> for InputSpecs {
	type Output = InputSpec;

	fn index(&self, name: &str) -> &Self::Output {
		match self.get(name) {
			Some(x) => x,
			None => panic!("no input called `{name}`"),
		}
	}
}

impl<'a> IntoIterator for &'a InputSpecs {
	type Item = &'a InputSpec;
	type IntoIter = std::slice::Iter<'a, InputSpec>;

	fn into_iter(self) -> Self::IntoIter {
		self.specs.iter()
	}
}

impl FromIterator<InputSpec> for InputSpecs {
	fn from_iter<T: IntoIterator<Item = InputSpec>>(iter: T) -> Self {
		Self {
			specs: iter.into_iter().collect(),
		}
	}
}
