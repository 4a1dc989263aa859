//! Content-addressed dataflow nodes.
//!
//! Nodes are declared with a [`NodeDecl`], constructed leaf-first by a
//! [`NodeRegistry`], and run through an [`Invocation`] that an external
//! driver resumes until it is done.

mod decl;
mod invocation;
mod node;
mod registry;

pub mod errors;
pub mod hash;
pub mod io;
pub mod labels;
pub mod routine;
pub mod spec;

pub use decl::NodeDecl;
pub use errors::{DeclarationError, GraphError, InvocationError, NodeError};
pub use invocation::Invocation;
pub use node::{Group, Node, NodeIdx};
pub use registry::NodeRegistry;
