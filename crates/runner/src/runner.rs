use nodeflow_node::{
	io::{Datum, NodeLogger, Request, Response, StreamHandle},
	labels::{NodeKey, StreamName},
	spec::StreamSpec,
	Invocation, Node, NodeRegistry,
};
use std::{
	collections::{BTreeMap, VecDeque},
	sync::Arc,
};
use tracing::{debug, trace};

use crate::{
	config::RunnerConfig,
	errors::RunError,
	store::{StreamId, StreamStore},
};

//
// MARK: Helper structs
//

/// One invocation and the stream it writes to
struct Task {
	invocation: Invocation,
	output: StreamId,

	/// How far this invocation has read each stream it pulls from
	cursors: BTreeMap<StreamId, usize>,
}

impl Task {
	fn new(invocation: Invocation, output: StreamId) -> Self {
		Self {
			invocation,
			output,
			cursors: BTreeMap::new(),
		}
	}
}

//
// MARK: Runner
//

/// Runs nodes one invocation at a time.
///
/// Every node runs to completion before any of its consumers starts,
/// so a pull never has to wait. Nodes with equal keys are computed once.
pub struct Runner<'a> {
	registry: &'a NodeRegistry,
	config: RunnerConfig,
	store: StreamStore,

	/// The root output stream of every node we've run
	done: BTreeMap<NodeKey, StreamId>,
}

impl<'a> Runner<'a> {
	pub fn new(registry: &'a NodeRegistry, config: RunnerConfig) -> Self {
		Self {
			registry,
			config,
			store: StreamStore::new(),
			done: BTreeMap::new(),
		}
	}

	/// Every stream produced so far
	pub fn store(&self) -> &StreamStore {
		&self.store
	}

	/// The output of `node`, if it has been run
	pub fn output(&self, node: &Node) -> Option<StreamId> {
		self.done.get(node.key()).copied()
	}

	/// Run `node` and everything it depends on.
	/// Returns `node`'s root output stream.
	pub fn run(&mut self, node: &Arc<Node>) -> Result<StreamId, RunError> {
		// `alldeps` are only meaningful in the registry that built `node`
		match self.registry.get(node.idx()) {
			Some(x) if Arc::ptr_eq(x, node) => {}
			_ => return Err(RunError::UnknownNode { idx: node.idx() }),
		}

		// Registry indices are a topological order
		for idx in node.alldeps() {
			let dep = self
				.registry
				.get(*idx)
				.ok_or(RunError::UnknownNode { idx: *idx })?
				.clone();
			self.run_one(&dep)?;
		}

		return self.run_one(node);
	}

	/// Run a single node whose dependencies have all been run
	fn run_one(&mut self, node: &Arc<Node>) -> Result<StreamId, RunError> {
		if let Some(id) = self.output(node) {
			trace!(message = "Node already computed", node = %node.abbrev(), stream = id);
			return Ok(id);
		}

		// Runner events and routine logs share this node's span
		let log = NodeLogger::new(node);
		let _span = log.span().enter();
		debug!(message = "Running node", node = %node.abbrev());

		let root = self
			.store
			.create(node.key(), None, node.group().is_group());
		let mut queue = VecDeque::from([Task::new(node.invoke(None), root)]);
		let mut invocations = 0usize;

		while let Some(task) = queue.pop_front() {
			invocations += 1;
			self.drive(node, &log, task, &mut queue)?;
		}

		debug!(
			message = "Node finished",
			node = %node.abbrev(),
			invocations,
			messages = self.store.messages(root).len()
		);

		self.done.insert(node.key().clone(), root);
		return Ok(root);
	}

	/// Serve one invocation's requests until it completes.
	/// Forked invocations are added to `queue`.
	fn drive(
		&mut self,
		node: &Arc<Node>,
		log: &NodeLogger,
		mut task: Task,
		queue: &mut VecDeque<Task>,
	) -> Result<(), RunError> {
		let mut response = Response::Start;
		let mut steps = 0usize;

		loop {
			let request = task.invocation.resume(response)?;

			// A plain invocation never ends by itself.
			// We stop it once its routine has finished one pass.
			if task.invocation.generation() > 1 {
				trace!(message = "Routine finished", node = %node.abbrev());
				break;
			}

			let Some(request) = request else {
				break;
			};

			steps += 1;
			if steps > self.config.max_steps {
				return Err(RunError::StepLimit {
					node: node.abbrev(),
					max_steps: self.config.max_steps,
				});
			}

			response = match request {
				Request::GetStream { spec } => Response::Handle(self.resolve(&spec)?),
				Request::Pull { handle } => Response::Pulled(self.pull(&mut task, &handle)?),

				Request::Push { datum } => {
					if !self.store.push(task.output, datum) {
						return Err(RunError::NoSuchStream { id: task.output });
					}
					Response::Ack
				}

				Request::GetLogger => Response::Logger(log.clone()),

				Request::Fork {
					name,
					inputs,
					group,
				} => {
					let name = StreamName::from(name);
					let child = self.store.create(node.key(), Some(name.clone()), group);
					let handle = self
						.store
						.handle(child)
						.ok_or(RunError::NoSuchStream { id: child })?;

					self.store.add_child(task.output, name, child);
					if !self.store.push(task.output, Datum::Stream(handle)) {
						return Err(RunError::NoSuchStream { id: task.output });
					}

					queue.push_back(Task::new(node.invoke(Some(inputs)), child));
					Response::Ack
				}
			};
		}

		self.store.close(task.output);
		return Ok(());
	}

	/// Find the stream a spec references
	fn resolve(&self, spec: &StreamSpec) -> Result<StreamHandle, RunError> {
		let node = spec.node();
		let root = self.output(node).ok_or_else(|| RunError::NotRun {
			node: node.key().clone(),
		})?;

		let id = match spec.stream() {
			None => root,
			Some(name) => self
				.store
				.child(root, name)
				.ok_or_else(|| RunError::UnknownStream {
					node: node.key().clone(),
					stream: name.clone(),
				})?,
		};

		return self.store.handle(id).ok_or(RunError::NoSuchStream { id });
	}

	/// Read the next message of a stream
	fn pull(&self, task: &mut Task, handle: &StreamHandle) -> Result<Option<Datum>, RunError> {
		let id = handle.id();
		if !self.store.contains(id) {
			return Err(RunError::NoSuchStream { id });
		}

		let cursor = task.cursors.entry(id).or_insert(0);
		let datum = self.store.message(id, *cursor).cloned();
		if datum.is_some() {
			*cursor += 1;
		}

		return Ok(datum);
	}
}
