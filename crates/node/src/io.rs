//! The requests an invocation sends to its driver, and the driver's answers.
//!
//! None of these are wire formats. They are passed in-process between an
//! [`crate::Invocation`] and whatever component is driving it.

use serde_json::Value;
use std::{collections::BTreeMap, fmt::Display};
use tracing::Span;

use crate::{
	labels::{InputName, NodeKey, StreamName},
	node::Node,
	spec::StreamSpec,
};

/// An opaque reference to a stream, handed out by the driver.
///
/// The engine never looks inside a handle, it only passes it back
/// to the driver with [`Request::Pull`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamHandle {
	id: u64,
	node: NodeKey,
	stream: Option<StreamName>,
}

impl StreamHandle {
	pub fn new(id: u64, node: NodeKey, stream: Option<StreamName>) -> Self {
		Self { id, node, stream }
	}

	/// The driver-assigned id of this stream
	pub fn id(&self) -> u64 {
		self.id
	}

	/// The node that produces this stream
	pub fn node(&self) -> &NodeKey {
		&self.node
	}

	pub fn stream(&self) -> Option<&StreamName> {
		self.stream.as_ref()
	}
}

/// A single value bound to an input or carried by a stream
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
	/// A plain value
	Value(Value),

	/// A handle to another stream.
	/// Group streams carry these.
	Stream(StreamHandle),
}

impl Datum {
	pub fn as_value(&self) -> Option<&Value> {
		match self {
			Self::Value(x) => Some(x),
			Self::Stream(_) => None,
		}
	}

	pub fn as_stream(&self) -> Option<&StreamHandle> {
		match self {
			Self::Value(_) => None,
			Self::Stream(x) => Some(x),
		}
	}
}

impl From<Value> for Datum {
	fn from(value: Value) -> Self {
		Self::Value(value)
	}
}

impl From<StreamHandle> for Datum {
	fn from(value: StreamHandle) -> Self {
		Self::Stream(value)
	}
}

/// Input bindings of one invocation, keyed by input name
pub type Inputs = BTreeMap<InputName, Datum>;

/// Something an invocation needs from its driver.
/// Every request is a suspension point.
#[derive(Debug, Clone)]
pub enum Request {
	/// Resolve a stream spec into a handle.
	/// Answered with [`Response::Handle`].
	GetStream { spec: StreamSpec },

	/// Get the next value of a stream.
	/// Answered with [`Response::Pulled`].
	Pull { handle: StreamHandle },

	/// Append a message to this invocation's output stream.
	/// Answered with [`Response::Ack`].
	Push { datum: Datum },

	/// Answered with [`Response::Logger`].
	GetLogger,

	/// Spawn another invocation of the same node with the given inputs.
	/// Answered with [`Response::Ack`].
	Fork {
		name: String,
		inputs: Inputs,
		group: bool,
	},
}

/// The driver's answer to a [`Request`]
#[derive(Debug, Clone)]
pub enum Response {
	/// The first value sent into an invocation or routine
	Start,

	/// Acknowledges a [`Request::Push`] or a [`Request::Fork`]
	Ack,

	Handle(StreamHandle),

	/// The next value of a stream, or `None` if it is exhausted
	Pulled(Option<Datum>),

	Logger(NodeLogger),
}

impl Response {
	/// A short name for this response's variant
	pub fn kind(&self) -> &'static str {
		match self {
			Self::Start => "start",
			Self::Ack => "ack",
			Self::Handle(_) => "stream handle",
			Self::Pulled(_) => "pulled value",
			Self::Logger(_) => "logger",
		}
	}
}

/// A leveled logger bound to one node.
/// Everything logged here is emitted inside this logger's span.
#[derive(Debug, Clone)]
pub struct NodeLogger {
	node: String,
	span: Span,
}

impl NodeLogger {
	pub fn new(node: &Node) -> Self {
		let abbrev = node.abbrev();
		let span = tracing::debug_span!(target: "nodeflow_node::routine", "node", node = %abbrev);
		Self { node: abbrev, span }
	}

	/// The abbreviated name of the node this logger belongs to
	pub fn node(&self) -> &str {
		&self.node
	}

	pub fn span(&self) -> &Span {
		&self.span
	}

	/// Very verbose messages, one per fork or pulled value
	pub fn noisy(&self, msg: impl Display) {
		let _e = self.span.enter();
		tracing::trace!(target: "nodeflow_node::routine", "{msg}");
	}

	pub fn debug(&self, msg: impl Display) {
		let _e = self.span.enter();
		tracing::debug!(target: "nodeflow_node::routine", "{msg}");
	}

	pub fn info(&self, msg: impl Display) {
		let _e = self.span.enter();
		tracing::info!(target: "nodeflow_node::routine", "{msg}");
	}

	pub fn warn(&self, msg: impl Display) {
		let _e = self.span.enter();
		tracing::warn!(target: "nodeflow_node::routine", "{msg}");
	}

	pub fn error(&self, msg: impl Display) {
		let _e = self.span.enter();
		tracing::error!(target: "nodeflow_node::routine", "{msg}");
	}
}
