//! In-memory storage for node output streams

use nodeflow_node::{
	io::{Datum, StreamHandle},
	labels::{NodeKey, StreamName},
};
use std::collections::BTreeMap;

/// The index of a stream in a [`StreamStore`]
pub type StreamId = u64;

#[derive(Debug)]
struct StreamData {
	node: NodeKey,
	name: Option<StreamName>,
	group: bool,
	closed: bool,
	messages: Vec<Datum>,

	/// Streams created by forks of the invocation writing this stream
	children: BTreeMap<StreamName, StreamId>,
}

/// Every stream produced during a run.
/// Streams are append-only and are never removed.
#[derive(Debug, Default)]
pub struct StreamStore {
	streams: Vec<StreamData>,
}

impl StreamStore {
	pub fn new() -> Self {
		Self::default()
	}

	fn get(&self, id: StreamId) -> Option<&StreamData> {
		usize::try_from(id).ok().and_then(|x| self.streams.get(x))
	}

	fn get_mut(&mut self, id: StreamId) -> Option<&mut StreamData> {
		usize::try_from(id).ok().and_then(|x| self.streams.get_mut(x))
	}

	/// Create a new, empty stream
	pub fn create(&mut self, node: &NodeKey, name: Option<StreamName>, group: bool) -> StreamId {
		let id = self.streams.len() as StreamId;
		self.streams.push(StreamData {
			node: node.clone(),
			name,
			group,
			closed: false,
			messages: Vec::new(),
			children: BTreeMap::new(),
		});
		return id;
	}

	pub fn contains(&self, id: StreamId) -> bool {
		self.get(id).is_some()
	}

	/// Make a handle that invocations may use to reference stream `id`
	pub fn handle(&self, id: StreamId) -> Option<StreamHandle> {
		self.get(id)
			.map(|x| StreamHandle::new(id, x.node.clone(), x.name.clone()))
	}

	/// Append a message to a stream.
	/// Returns `false` if this stream doesn't exist or is closed.
	pub fn push(&mut self, id: StreamId, datum: Datum) -> bool {
		match self.get_mut(id) {
			Some(s) if !s.closed => {
				s.messages.push(datum);
				true
			}
			_ => false,
		}
	}

	/// Register `child` as the stream named `name` under `parent`
	pub fn add_child(&mut self, parent: StreamId, name: StreamName, child: StreamId) {
		if let Some(s) = self.get_mut(parent) {
			s.children.insert(name, child);
		}
	}

	pub fn child(&self, parent: StreamId, name: &StreamName) -> Option<StreamId> {
		self.get(parent).and_then(|x| x.children.get(name).copied())
	}

	/// Mark a stream as finished. Closed streams reject new messages.
	pub fn close(&mut self, id: StreamId) {
		if let Some(s) = self.get_mut(id) {
			s.closed = true;
		}
	}

	pub fn is_closed(&self, id: StreamId) -> bool {
		self.get(id).is_some_and(|x| x.closed)
	}

	pub fn is_group(&self, id: StreamId) -> bool {
		self.get(id).is_some_and(|x| x.group)
	}

	/// The message at position `idx` of stream `id`
	pub fn message(&self, id: StreamId, idx: usize) -> Option<&Datum> {
		self.get(id).and_then(|x| x.messages.get(idx))
	}

	/// All messages in stream `id`
	pub fn messages(&self, id: StreamId) -> &[Datum] {
		self.get(id).map(|x| x.messages.as_slice()).unwrap_or(&[])
	}

	/// The child streams of stream `id`, sorted by name
	pub fn children(&self, id: StreamId) -> impl Iterator<Item = (&StreamName, StreamId)> + '_ {
		self.get(id)
			.into_iter()
			.flat_map(|x| x.children.iter().map(|(k, v)| (k, *v)))
	}
}
