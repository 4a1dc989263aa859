//! The invocation protocol.
//!
//! An [`Invocation`] is a state machine driven by an external driver.
//! The driver resumes it with a [`Response`] and gets back the next
//! [`Request`] it must serve. The first resume must carry
//! [`Response::Start`].
//!
//! A node with foreach inputs never runs its routine. Its invocation
//! only resolves inputs and emits one [`Request::Fork`] per input
//! combination. A node without foreach inputs relays between its
//! routine and the driver, restarting the routine whenever it returns.
//! Stopping such an invocation is up to the driver. A routine that
//! returns before issuing any request completes the invocation.

use itertools::Itertools;
use serde_json::Value;
use std::{collections::VecDeque, sync::Arc};
use tracing::trace;

use crate::{
	errors::InvocationError,
	io::{Datum, Inputs, NodeLogger, Request, Response, StreamHandle},
	labels::InputName,
	node::Node,
	routine::{Routine, Step},
	spec::{InputSpec, SpecValue},
};

/// Resolved inputs, sorted by how they are bound
#[derive(Debug, Default)]
struct Buckets {
	/// Bound once, shared by every fork
	common: Inputs,

	/// Foreach arrays, one cross product axis each
	axes: Vec<(InputName, Vec<Value>)>,

	/// Foreach streams. We support at most one.
	streams: Vec<(InputName, StreamHandle)>,
}

impl Buckets {
	fn has_foreach(&self) -> bool {
		!self.axes.is_empty() || !self.streams.is_empty()
	}
}

/// Fan-out progress
struct Fanout {
	log: NodeLogger,
	common: Inputs,

	/// Every combination of foreach array values
	cross: Vec<Inputs>,

	/// The foreach stream we pull from, if any
	stream: Option<(InputName, StreamHandle)>,

	/// Forks we have yet to request
	queue: VecDeque<Inputs>,

	/// The label of the next fork
	next: u64,

	/// If true, we're waiting for a pulled value.
	/// If false, we're waiting for a fork ack.
	pulling: bool,
}

enum State {
	Start {
		explicit: Option<Inputs>,
	},

	Resolving {
		pending: VecDeque<InputSpec>,
		awaiting: InputSpec,
		buckets: Buckets,
	},

	AwaitLogger {
		buckets: Buckets,
	},

	Fanout(Fanout),

	Relay {
		inputs: Inputs,
		routine: Box<dyn Routine>,
	},

	Completed,
}

/// One activation of a node
pub struct Invocation {
	node: Arc<Node>,
	state: State,
	generation: u64,
}

/// Every combination of one value per axis.
/// The first axis varies slowest.
fn cross_product(axes: &[(InputName, Vec<Value>)]) -> Vec<Inputs> {
	if axes.is_empty() {
		return vec![Inputs::new()];
	}

	axes.iter()
		.map(|(name, values)| {
			values
				.iter()
				.map(|v| (name.clone(), Datum::Value(v.clone())))
				.collect::<Vec<_>>()
		})
		.multi_cartesian_product()
		.map(|combo| combo.into_iter().collect())
		.collect()
}

impl Invocation {
	pub(crate) fn new(node: Arc<Node>, inputs: Option<Inputs>) -> Self {
		Self {
			node,
			state: State::Start { explicit: inputs },
			generation: 0,
		}
	}

	/// The node we're invoking
	pub fn node(&self) -> &Arc<Node> {
		&self.node
	}

	/// The number of routines this invocation has started.
	/// A value greater than one means the routine was restarted.
	pub fn generation(&self) -> u64 {
		self.generation
	}

	/// Has this invocation finished?
	/// Fan-out invocations, failed invocations and routines
	/// with nothing to do finish.
	pub fn is_completed(&self) -> bool {
		matches!(self.state, State::Completed)
	}

	/// Resume this invocation with the driver's answer to its last request.
	///
	/// Returns the next request, or `None` once this invocation is completed.
	/// An invocation that returned an error is completed.
	pub fn resume(&mut self, resumed: Response) -> Result<Option<Request>, InvocationError> {
		let state = std::mem::replace(&mut self.state, State::Completed);
		let (state, request) = self.step(state, resumed)?;
		self.state = state;
		return Ok(request);
	}

	fn unexpected(&self, expected: &'static str, got: &Response) -> InvocationError {
		InvocationError::UnexpectedResponse {
			node: self.node.abbrev(),
			expected,
			got: got.kind(),
		}
	}

	fn step(
		&mut self,
		state: State,
		resumed: Response,
	) -> Result<(State, Option<Request>), InvocationError> {
		match (state, resumed) {
			(State::Completed, _) => Ok((State::Completed, None)),

			(State::Start { explicit }, Response::Start) => match explicit {
				Some(inputs) => self.start_relay(inputs),
				None => {
					self.check_foreach_streams()?;
					let pending = self.node.specs().iter().cloned().collect();
					self.resolve(pending, Buckets::default())
				}
			},
			(State::Start { .. }, r) => Err(self.unexpected("start", &r)),

			(
				State::Resolving {
					pending,
					awaiting,
					mut buckets,
				},
				Response::Handle(handle),
			) => {
				if awaiting.is_foreach() {
					buckets.streams.push((awaiting.name().clone(), handle));
				} else {
					buckets
						.common
						.insert(awaiting.name().clone(), Datum::Stream(handle));
				}
				self.resolve(pending, buckets)
			}
			(State::Resolving { .. }, r) => Err(self.unexpected("stream handle", &r)),

			(State::AwaitLogger { buckets }, Response::Logger(log)) => {
				self.start_fanout(buckets, log)
			}
			(State::AwaitLogger { .. }, r) => Err(self.unexpected("logger", &r)),

			(State::Fanout(fan), Response::Ack) if !fan.pulling => self.fanout_next(fan),
			(State::Fanout(mut fan), Response::Pulled(value)) if fan.pulling => match value {
				None => {
					fan.log.noisy("finished forking");
					Ok((State::Completed, None))
				}

				Some(value) => {
					if let Some((name, _)) = &fan.stream {
						for combo in &fan.cross {
							let mut inputs = combo.clone();
							inputs.extend(fan.common.clone());
							inputs.insert(name.clone(), value.clone());
							fan.queue.push_back(inputs);
						}
					}
					self.fanout_next(fan)
				}
			},
			(State::Fanout(fan), r) => {
				let expected = if fan.pulling { "pulled value" } else { "ack" };
				Err(self.unexpected(expected, &r))
			}

			(State::Relay { inputs, mut routine }, r) => {
				let step = routine
					.resume(r)
					.map_err(|source| InvocationError::Routine {
						node: self.node.abbrev(),
						source,
					})?;

				match step {
					Step::Request(req) => Ok((State::Relay { inputs, routine }, Some(req))),
					Step::Return => {
						trace!(
							message = "Routine returned, restarting",
							node = %self.node.abbrev(),
							generation = self.generation
						);
						self.start_relay(inputs)
					}
				}
			}
		}
	}

	/// Fail early if we would need to pull from more than one stream
	fn check_foreach_streams(&self) -> Result<(), InvocationError> {
		let streams = self
			.node
			.specs()
			.iter()
			.filter(|x| x.is_foreach() && x.value().as_stream().is_some())
			.map(|x| x.name().clone())
			.collect::<Vec<_>>();

		if streams.len() > 1 {
			return Err(InvocationError::MultipleForeachStreams {
				node: self.node.abbrev(),
				inputs: streams,
			});
		}

		return Ok(());
	}

	/// Bind plain inputs until we reach one that needs a stream handle
	fn resolve(
		&mut self,
		mut pending: VecDeque<InputSpec>,
		mut buckets: Buckets,
	) -> Result<(State, Option<Request>), InvocationError> {
		while let Some(spec) = pending.pop_front() {
			match (spec.value(), spec.is_foreach()) {
				(SpecValue::Stream(s), _) => {
					let request = Request::GetStream { spec: s.clone() };
					return Ok((
						State::Resolving {
							pending,
							awaiting: spec,
							buckets,
						},
						Some(request),
					));
				}

				(SpecValue::Plain(Value::Array(values)), true) => {
					buckets.axes.push((spec.name().clone(), values.clone()));
				}

				(_, true) => {
					return Err(InvocationError::ForeachNotIterable {
						node: self.node.abbrev(),
						input: spec.name().clone(),
					})
				}

				(SpecValue::Plain(v), false) => {
					buckets
						.common
						.insert(spec.name().clone(), Datum::Value(v.clone()));
				}

				(SpecValue::None, false) => {
					buckets
						.common
						.insert(spec.name().clone(), Datum::Value(Value::Null));
				}
			}
		}

		if buckets.has_foreach() {
			return Ok((State::AwaitLogger { buckets }, Some(Request::GetLogger)));
		}

		return self.start_relay(buckets.common);
	}

	fn start_fanout(
		&mut self,
		mut buckets: Buckets,
		log: NodeLogger,
	) -> Result<(State, Option<Request>), InvocationError> {
		if buckets.streams.len() > 1 {
			return Err(InvocationError::MultipleForeachStreams {
				node: self.node.abbrev(),
				inputs: buckets.streams.into_iter().map(|(x, _)| x).collect(),
			});
		}

		let stream = buckets.streams.pop();
		let cross = cross_product(&buckets.axes);

		// Without a stream, we know every fork up front
		let queue = if stream.is_none() {
			cross
				.iter()
				.map(|combo| {
					let mut inputs = combo.clone();
					inputs.extend(buckets.common.clone());
					inputs
				})
				.collect()
		} else {
			VecDeque::new()
		};

		return self.fanout_next(Fanout {
			log,
			common: buckets.common,
			cross,
			stream,
			queue,
			next: 0,
			pulling: false,
		});
	}

	fn fanout_next(&mut self, mut fan: Fanout) -> Result<(State, Option<Request>), InvocationError> {
		if let Some(inputs) = fan.queue.pop_front() {
			let name = fan.next.to_string();
			fan.next += 1;
			fan.pulling = false;
			fan.log.noisy(format_args!("FORK {name} with: {inputs:?}"));

			let request = Request::Fork {
				name,
				inputs,
				group: false,
			};
			return Ok((State::Fanout(fan), Some(request)));
		}

		let handle = match &fan.stream {
			Some((_, handle)) => handle.clone(),
			None => {
				fan.log.noisy("finished forking");
				return Ok((State::Completed, None));
			}
		};

		fan.pulling = true;
		return Ok((State::Fanout(fan), Some(Request::Pull { handle })));
	}

	/// Start a fresh routine and run it up to its first request
	fn start_relay(&mut self, inputs: Inputs) -> Result<(State, Option<Request>), InvocationError> {
		self.generation += 1;
		let mut routine = self.node.call(&inputs);

		let step = routine
			.resume(Response::Start)
			.map_err(|source| InvocationError::Routine {
				node: self.node.abbrev(),
				source,
			})?;

		match step {
			Step::Request(req) => Ok((State::Relay { inputs, routine }, Some(req))),

			// Nothing to emit for these inputs
			Step::Return => {
				trace!(
					message = "Routine returned without a request",
					node = %self.node.abbrev(),
					generation = self.generation
				);
				Ok((State::Completed, None))
			}
		}
	}
}
