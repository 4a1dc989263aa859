//! Cooperative routines, the user-level computation inside a node.
//!
//! A routine is resumed by its invocation with the driver's latest
//! [`Response`] and answers with the next [`Request`] it needs served,
//! or with [`Step::Return`] once it is done. The first resume of every
//! routine carries [`Response::Start`].

use std::{fmt::Debug, sync::Arc};

use crate::{
	errors::RoutineError,
	io::{Inputs, Request, Response},
};

/// What a routine does after being resumed
#[derive(Debug)]
pub enum Step {
	/// Suspend until the driver answers this request
	Request(Request),

	/// This routine is done
	Return,
}

pub trait Routine: Send {
	/// Resume this routine with the driver's answer to its last request.
	fn resume(&mut self, resumed: Response) -> Result<Step, RoutineError>;
}

impl<F> Routine for F
where
	F: FnMut(Response) -> Result<Step, RoutineError> + Send,
{
	fn resume(&mut self, resumed: Response) -> Result<Step, RoutineError> {
		self(resumed)
	}
}

/// Box a closure as a routine.
///
/// ```ignore
/// let mut sent = false;
/// let r = routine(move |_| {
/// 	if sent {
/// 		return Ok(Step::Return);
/// 	}
/// 	sent = true;
/// 	Ok(Step::Request(Request::Push { datum: json!(1).into() }))
/// });
/// ```
pub fn routine<F>(f: F) -> Box<dyn Routine>
where
	F: FnMut(Response) -> Result<Step, RoutineError> + Send + 'static,
{
	Box::new(f)
}

// This type must be send + sync, many invocations of one node may run at once.
type NodeFuncType = dyn Fn(&Inputs) -> Box<dyn Routine> + Send + Sync;

/// A routine definition.
/// Each call starts a fresh routine bound to the given inputs.
#[derive(Clone)]
pub struct NodeFunc(Arc<NodeFuncType>);

impl NodeFunc {
	pub fn new<F>(f: F) -> Self
	where
		F: Fn(&Inputs) -> Box<dyn Routine> + Send + Sync + 'static,
	{
		Self(Arc::new(f))
	}

	/// Start a new routine
	pub fn start(&self, inputs: &Inputs) -> Box<dyn Routine> {
		(self.0)(inputs)
	}
}

impl Debug for NodeFunc {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "NodeFunc")
	}
}
