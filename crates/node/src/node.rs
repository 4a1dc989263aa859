use serde::{Deserialize, Serialize};
use smartstring::{LazyCompact, SmartString};
use std::{
	collections::BTreeSet,
	fmt::{Debug, Display},
	sync::Arc,
};

use crate::{
	io::Inputs,
	invocation::Invocation,
	labels::NodeKey,
	routine::{NodeFunc, Routine},
	spec::InputSpecs,
};

/// Number of hash characters shown in [`Node::abbrev`]
const ABBREV_HASH_LEN: usize = 10;

/// The index of a node in a [`crate::NodeRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIdx(pub(crate) usize);

impl NodeIdx {
	/// Get this index as a `usize`
	pub fn as_usize(&self) -> usize {
		self.0
	}
}

impl From<NodeIdx> for usize {
	fn from(value: NodeIdx) -> Self {
		value.0
	}
}

impl Display for NodeIdx {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "node #{}", self.0)
	}
}

/// Is a node's default stream a namespace of further streams?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Group {
	Never,
	Always,
	OnDemand,
}

impl Group {
	pub fn is_group(&self) -> bool {
		!matches!(self, Self::Never)
	}
}

/// An addressable computation: a routine definition, its bound
/// input specs, and its place in the dependency graph.
///
/// Nodes are immutable once constructed. The inverse edges
/// (`consumers` and `dependent`) are kept by the registry that
/// built the node.
pub struct Node {
	pub(crate) idx: NodeIdx,
	pub(crate) func: NodeFunc,
	pub(crate) name: SmartString<LazyCompact>,
	pub(crate) namespace: Option<SmartString<LazyCompact>>,
	pub(crate) fullname: SmartString<LazyCompact>,
	pub(crate) schema: Option<SmartString<LazyCompact>>,
	pub(crate) header_schema: Option<SmartString<LazyCompact>>,
	pub(crate) version: Option<u32>,
	pub(crate) specs: InputSpecs,
	pub(crate) specs_hash: String,
	pub(crate) key: NodeKey,
	pub(crate) group: Group,
	pub(crate) deps: BTreeSet<NodeIdx>,
	pub(crate) alldeps: BTreeSet<NodeIdx>,
}

impl Node {
	/// This node's index in the registry that built it
	pub fn idx(&self) -> NodeIdx {
		self.idx
	}

	/// This node's identity.
	/// Unless overridden, this is `specs_hash-fullname`.
	pub fn key(&self) -> &NodeKey {
		&self.key
	}

	/// A short label for logs
	pub fn abbrev(&self) -> String {
		let n = ABBREV_HASH_LEN.min(self.specs_hash.len());
		format!("{}.{}", self.name, &self.specs_hash[..n])
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn namespace(&self) -> Option<&str> {
		self.namespace.as_deref()
	}

	/// `namespace:name`, or `name` if this node has no namespace
	pub fn fullname(&self) -> &str {
		&self.fullname
	}

	pub fn schema(&self) -> Option<&str> {
		self.schema.as_deref()
	}

	pub fn header_schema(&self) -> Option<&str> {
		self.header_schema.as_deref()
	}

	pub fn version(&self) -> Option<u32> {
		self.version
	}

	/// Input specs in declaration order
	pub fn specs(&self) -> &InputSpecs {
		&self.specs
	}

	pub fn specs_hash(&self) -> &str {
		&self.specs_hash
	}

	pub fn group(&self) -> Group {
		self.group
	}

	pub fn func(&self) -> &NodeFunc {
		&self.func
	}

	/// Nodes whose streams are inputs of this node
	pub fn deps(&self) -> &BTreeSet<NodeIdx> {
		&self.deps
	}

	/// `deps`, and all their dependencies
	pub fn alldeps(&self) -> &BTreeSet<NodeIdx> {
		&self.alldeps
	}

	/// Start this node's routine directly, bypassing the invocation protocol
	pub fn call(&self, inputs: &Inputs) -> Box<dyn Routine> {
		self.func.start(inputs)
	}

	/// Start a new invocation of this node.
	///
	/// If `inputs` is given, input resolution is skipped and the
	/// routine runs with exactly these inputs.
	pub fn invoke(self: &Arc<Self>, inputs: Option<Inputs>) -> Invocation {
		Invocation::new(self.clone(), inputs)
	}
}

impl Display for Node {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.key)
	}
}

impl Debug for Node {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "<Node {}>", self.abbrev())
	}
}
