//! Errors we may encounter while declaring, constructing or invoking nodes

use nodeflow_util::names::NameError;
use std::error::Error;
use thiserror::Error;

use crate::{
	labels::{InputName, NodeKey},
	node::NodeIdx,
};

/// An error a user routine may return while it is being resumed
pub type RoutineError = Box<dyn Error + Send + Sync + 'static>;

/// An error we encounter while declaring a node's inputs
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeclarationError {
	/// Two inputs of one declaration share a name
	#[error("input `{name}` was declared twice")]
	InputNameCollision { name: InputName },

	/// An input or node name is malformed
	#[error("invalid name `{name}`")]
	InvalidName {
		name: String,
		#[source]
		source: NameError,
	},
}

/// Which inverse edge set a [`GraphError::DuplicateEdge`] was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
	/// A direct dependency, recorded in `consumers`
	Consumer,

	/// A transitive dependency, recorded in `dependent`
	Dependent,
}

impl std::fmt::Display for EdgeKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Consumer => write!(f, "consumer"),
			Self::Dependent => write!(f, "dependent"),
		}
	}
}

/// A violated dependency graph invariant.
/// If we encounter one of these, nodes were constructed out of order.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
	/// This edge has already been registered
	#[error("{consumer} is already a {kind} of {dependency}")]
	DuplicateEdge {
		dependency: NodeIdx,
		consumer: NodeIdx,
		kind: EdgeKind,
	},

	/// A node would consume its own output
	#[error("{node} would depend on itself")]
	SelfLoop { node: NodeIdx },

	/// A stream spec references a node that was not built by this registry
	#[error("{dependency} is not part of this registry")]
	ForeignNode { dependency: NodeKey },
}

/// An error we encounter while constructing a node
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeError {
	#[error("bad declaration")]
	Declaration(#[from] DeclarationError),

	/// Only one foreach input may reference a stream
	#[error("node `{node}` has more than one foreach stream input: {inputs:?}")]
	MultipleForeachStreams {
		node: String,
		inputs: Vec<InputName>,
	},

	/// Foreach inputs must be streams or arrays
	#[error("foreach input `{input}` of node `{node}` is neither an array nor a stream")]
	ForeachNotIterable { node: String, input: InputName },

	/// `clone_node` was asked to override inputs that don't exist
	#[error("node `{node}` has no inputs named {names:?}")]
	UnknownOverride {
		node: String,
		names: Vec<InputName>,
	},

	#[error("graph invariant violated")]
	Graph(#[from] GraphError),
}

/// An error we encounter while driving an invocation.
/// An invocation that returned an error is finished.
#[derive(Debug, Error)]
pub enum InvocationError {
	/// The driver answered a request with the wrong kind of response
	#[error("invocation of `{node}` expected {expected}, got {got}")]
	UnexpectedResponse {
		node: String,
		expected: &'static str,
		got: &'static str,
	},

	#[error("foreach input `{input}` of node `{node}` is neither an array nor a stream")]
	ForeachNotIterable { node: String, input: InputName },

	#[error("node `{node}` has more than one foreach stream input: {inputs:?}")]
	MultipleForeachStreams {
		node: String,
		inputs: Vec<InputName>,
	},

	/// The user routine failed
	#[error("routine of `{node}` failed")]
	Routine {
		node: String,
		#[source]
		source: RoutineError,
	},
}
