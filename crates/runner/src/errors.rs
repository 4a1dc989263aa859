use nodeflow_node::{
	labels::{NodeKey, StreamName},
	InvocationError, NodeIdx,
};
use thiserror::Error;

use crate::store::StreamId;

/// An error we encounter while running a graph
#[derive(Debug, Error)]
pub enum RunError {
	/// An invocation failed
	#[error("invocation failed")]
	Invocation(#[from] InvocationError),

	/// An invocation issued too many requests
	#[error("`{node}` issued more than {max_steps} requests")]
	StepLimit { node: String, max_steps: usize },

	/// A node that isn't in our registry, or depends on one that isn't
	#[error("{idx} is not part of this registry")]
	UnknownNode { idx: NodeIdx },

	/// A stream was requested from a node that hasn't run yet
	#[error("node `{node}` has not been run")]
	NotRun { node: NodeKey },

	/// A stream spec names a stream its node never created
	#[error("node `{node}` has no stream named `{stream}`")]
	UnknownStream { node: NodeKey, stream: StreamName },

	/// A handle references a stream that doesn't exist
	#[error("stream {id} does not exist")]
	NoSuchStream { id: StreamId },
}
