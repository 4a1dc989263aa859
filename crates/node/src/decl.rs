//! Node declarations.
//!
//! A [`NodeDecl`] collects a routine definition and its input specs.
//! It is turned into a [`crate::Node`] by [`crate::NodeRegistry::add`].

use nodeflow_util::names::check_name;
use smartstring::{LazyCompact, SmartString};

use crate::{
	errors::DeclarationError,
	io::Inputs,
	labels::NodeKey,
	node::Group,
	routine::{NodeFunc, Routine},
	spec::{InputSpec, InputSpecs, SpecValue},
};

/// Declare a node whose namespace is the calling module.
///
/// ```ignore
/// let decl = node_decl!("bagmeta", bagmeta)?.input("path", json!("/data"))?;
/// ```
#[macro_export]
macro_rules! node_decl {
	($name:expr, $func:expr) => {
		$crate::NodeDecl::new($name, $func).map(|d| d.namespace(module_path!()))
	};
}

/// Everything needed to construct a node
#[derive(Debug, Clone)]
pub struct NodeDecl {
	pub(crate) func: NodeFunc,
	pub(crate) name: SmartString<LazyCompact>,
	pub(crate) namespace: Option<SmartString<LazyCompact>>,
	pub(crate) specs: InputSpecs,
	pub(crate) schema: Option<SmartString<LazyCompact>>,
	pub(crate) header_schema: Option<SmartString<LazyCompact>>,
	pub(crate) group: Option<Group>,
	pub(crate) version: Option<u32>,
	pub(crate) key: Option<NodeKey>,
}

fn checked(name: &str) -> Result<(), DeclarationError> {
	check_name(name).map_err(|source| DeclarationError::InvalidName {
		name: name.into(),
		source,
	})
}

impl NodeDecl {
	/// Declare a node called `name` that runs `func`
	pub fn new<F>(name: &str, func: F) -> Result<Self, DeclarationError>
	where
		F: Fn(&Inputs) -> Box<dyn Routine> + Send + Sync + 'static,
	{
		Self::with_func(name, NodeFunc::new(func))
	}

	/// Declare a node called `name` that runs an existing routine definition
	pub fn with_func(name: &str, func: NodeFunc) -> Result<Self, DeclarationError> {
		checked(name)?;
		return Ok(Self {
			func,
			name: name.into(),
			namespace: None,
			specs: InputSpecs::new(),
			schema: None,
			header_schema: None,
			group: None,
			version: None,
			key: None,
		});
	}

	fn add_spec(mut self, spec: InputSpec) -> Result<Self, DeclarationError> {
		checked(spec.name().as_str())?;
		if self.specs.contains(spec.name().as_str()) {
			return Err(DeclarationError::InputNameCollision {
				name: spec.name().clone(),
			});
		}

		self.specs.push(spec);
		return Ok(self);
	}

	/// Declare an input bound once for every invocation.
	/// Use [`SpecValue::None`] for an input without a default.
	pub fn input(
		self,
		name: &str,
		default: impl Into<SpecValue>,
	) -> Result<Self, DeclarationError> {
		self.add_spec(InputSpec::new(name, default, false))
	}

	/// Declare an input that fans out: one invocation per element
	/// of an array, or per value pulled from a stream.
	pub fn foreach(self, name: &str, value: impl Into<SpecValue>) -> Result<Self, DeclarationError> {
		self.add_spec(InputSpec::new(name, value, true))
	}

	/// Defaults to the empty namespace
	pub fn namespace(mut self, namespace: &str) -> Self {
		self.namespace = Some(namespace.into());
		self
	}

	/// The schema of this node's output messages
	pub fn schema(mut self, schema: &str) -> Self {
		self.schema = Some(schema.into());
		self
	}

	/// The schema of this node's stream header
	pub fn header(mut self, schema: &str) -> Self {
		self.header_schema = Some(schema.into());
		self
	}

	/// Defaults to [`Group::Always`] if any input is foreach,
	/// and [`Group::Never`] otherwise.
	pub fn group(mut self, group: Group) -> Self {
		self.group = Some(group);
		self
	}

	/// Currently has no effect
	pub fn version(mut self, version: u32) -> Self {
		self.version = Some(version);
		self
	}

	/// Use `key` as this node's identity instead of its content address
	pub fn key(mut self, key: impl Into<NodeKey>) -> Self {
		self.key = Some(key.into());
		self
	}

	/// Input specs in declaration order
	pub fn specs(&self) -> &InputSpecs {
		&self.specs
	}
}
