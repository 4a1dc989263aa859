//! Node construction and the dependency graph between nodes.
//!
//! Nodes can only reference nodes that already exist, so a registry
//! is built leaf-first and its graph can never contain a cycle.

use smartstring::{LazyCompact, SmartString};
use std::{
	collections::{BTreeMap, BTreeSet},
	sync::Arc,
};
use tracing::debug;

use crate::{
	decl::NodeDecl,
	errors::{EdgeKind, GraphError, NodeError},
	hash::genhash,
	labels::{InputName, NodeKey},
	node::{Group, Node, NodeIdx},
	spec::{InputSpecs, SpecValue},
};

/// Owns every node of one graph, and the edges that point
/// from a node to the nodes consuming its output.
#[derive(Debug, Default)]
pub struct NodeRegistry {
	/// Array of nodes, indexed by [`NodeIdx`]
	nodes: Vec<Arc<Node>>,

	/// Nodes that directly depend on each node
	consumers: Vec<BTreeSet<NodeIdx>>,

	/// Nodes that transitively depend on each node
	dependent: Vec<BTreeSet<NodeIdx>>,

	/// The first node constructed with each key
	by_key: BTreeMap<NodeKey, NodeIdx>,
}

/// Make sure a node's specs can be invoked.
fn check_shape(fullname: &str, specs: &InputSpecs) -> Result<(), NodeError> {
	let mut foreach_streams = Vec::new();

	for spec in specs.iter().filter(|x| x.is_foreach()) {
		match spec.value() {
			SpecValue::Stream(_) => foreach_streams.push(spec.name().clone()),
			SpecValue::Plain(v) if v.is_array() => {}
			_ => {
				return Err(NodeError::ForeachNotIterable {
					node: fullname.into(),
					input: spec.name().clone(),
				})
			}
		}
	}

	// We support at most one foreach stream.
	// Pulling from several would need a policy for interleaving them.
	if foreach_streams.len() > 1 {
		return Err(NodeError::MultipleForeachStreams {
			node: fullname.into(),
			inputs: foreach_streams,
		});
	}

	return Ok(());
}

impl NodeRegistry {
	/// Create an empty registry
	pub fn new() -> Self {
		Self::default()
	}

	/// The number of nodes in this registry
	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	/// Get a node by index
	pub fn get(&self, idx: NodeIdx) -> Option<&Arc<Node>> {
		self.nodes.get(idx.as_usize())
	}

	/// Find the first node with the given key
	pub fn find(&self, key: &NodeKey) -> Option<&Arc<Node>> {
		self.by_key.get(key).and_then(|idx| self.get(*idx))
	}

	/// Iterate over all nodes in construction order.
	/// Every node comes after all of its dependencies.
	pub fn iter(&self) -> impl Iterator<Item = &Arc<Node>> {
		self.nodes.iter()
	}

	/// Nodes that directly consume `node`'s streams
	pub fn consumers<'a>(&'a self, node: &Node) -> impl Iterator<Item = &'a Arc<Node>> + 'a {
		self.consumers
			.get(node.idx().as_usize())
			.into_iter()
			.flatten()
			.filter_map(|x| self.get(*x))
	}

	/// Nodes that directly or transitively consume `node`'s streams
	pub fn dependent<'a>(&'a self, node: &Node) -> impl Iterator<Item = &'a Arc<Node>> + 'a {
		self.dependent
			.get(node.idx().as_usize())
			.into_iter()
			.flatten()
			.filter_map(|x| self.get(*x))
	}

	/// Find the index of a node that belongs to this registry
	fn resolve(&self, node: &Arc<Node>) -> Result<NodeIdx, GraphError> {
		match self.get(node.idx()) {
			Some(x) if Arc::ptr_eq(x, node) => Ok(node.idx()),
			_ => Err(GraphError::ForeignNode {
				dependency: node.key().clone(),
			}),
		}
	}

	fn edges(&self, kind: EdgeKind) -> &Vec<BTreeSet<NodeIdx>> {
		match kind {
			EdgeKind::Consumer => &self.consumers,
			EdgeKind::Dependent => &self.dependent,
		}
	}

	/// Check that the edge `dependency -> consumer` may be added
	fn check_edge(
		&self,
		dependency: NodeIdx,
		consumer: NodeIdx,
		kind: EdgeKind,
	) -> Result<(), GraphError> {
		if dependency == consumer {
			return Err(GraphError::SelfLoop { node: consumer });
		}

		let exists = self
			.edges(kind)
			.get(dependency.as_usize())
			.is_some_and(|x| x.contains(&consumer));

		if exists {
			return Err(GraphError::DuplicateEdge {
				dependency,
				consumer,
				kind,
			});
		}

		return Ok(());
	}

	/// Record the edge `dependency -> consumer`.
	/// Each edge may only be registered once.
	pub(crate) fn register_edge(
		&mut self,
		dependency: NodeIdx,
		consumer: NodeIdx,
		kind: EdgeKind,
	) -> Result<(), GraphError> {
		self.check_edge(dependency, consumer, kind)?;

		let edges = match kind {
			EdgeKind::Consumer => &mut self.consumers,
			EdgeKind::Dependent => &mut self.dependent,
		};

		if let Some(set) = edges.get_mut(dependency.as_usize()) {
			set.insert(consumer);
		}

		return Ok(());
	}

	/// Construct a node from a declaration.
	///
	/// Every stream this node consumes must come from a node in this registry.
	/// If this returns an error, the registry is unchanged.
	pub fn add(&mut self, decl: NodeDecl) -> Result<Arc<Node>, NodeError> {
		let idx = NodeIdx(self.nodes.len());

		let fullname: SmartString<LazyCompact> = match &decl.namespace {
			Some(ns) if !ns.is_empty() => format!("{ns}:{}", decl.name).into(),
			_ => decl.name.clone(),
		};

		check_shape(&fullname, &decl.specs)?;

		let mut deps = BTreeSet::new();
		for spec in decl.specs.iter() {
			if let SpecValue::Stream(s) = spec.value() {
				deps.insert(self.resolve(s.node())?);
			}
		}

		let mut alldeps = deps.clone();
		for dep in &deps {
			if let Some(node) = self.get(*dep) {
				alldeps.extend(node.alldeps.iter().copied());
			}
		}

		// Validate everything before we touch the graph
		for dep in &deps {
			self.check_edge(*dep, idx, EdgeKind::Consumer)?;
		}
		for dep in &alldeps {
			self.check_edge(*dep, idx, EdgeKind::Dependent)?;
		}

		let specs_hash = genhash(&decl.specs);
		let key = decl
			.key
			.unwrap_or_else(|| format!("{specs_hash}-{fullname}").into());
		let group = decl.group.unwrap_or_else(|| {
			if decl.specs.iter().any(|x| x.is_foreach()) {
				Group::Always
			} else {
				Group::Never
			}
		});

		let node = Arc::new(Node {
			idx,
			func: decl.func,
			name: decl.name,
			namespace: decl.namespace,
			fullname,
			schema: decl.schema,
			header_schema: decl.header_schema,
			version: decl.version,
			specs: decl.specs,
			specs_hash,
			key,
			group,
			deps,
			alldeps,
		});

		self.nodes.push(node.clone());
		self.consumers.push(BTreeSet::new());
		self.dependent.push(BTreeSet::new());
		self.by_key.entry(node.key().clone()).or_insert(idx);

		for dep in &node.deps {
			self.register_edge(*dep, idx, EdgeKind::Consumer)?;
		}
		for dep in &node.alldeps {
			self.register_edge(*dep, idx, EdgeKind::Dependent)?;
		}

		debug!(
			message = "Constructed node",
			node = %node.abbrev(),
			key = %node.key(),
			deps = node.deps.len(),
			alldeps = node.alldeps.len(),
		);

		return Ok(node);
	}

	/// Construct a copy of `node` with some inputs bound to new values.
	///
	/// Every override must name one of `node`'s inputs. The copy
	/// has its own identity and its own edges.
	pub fn clone_node<K, V>(
		&mut self,
		node: &Node,
		overrides: impl IntoIterator<Item = (K, V)>,
	) -> Result<Arc<Node>, NodeError>
	where
		K: Into<InputName>,
		V: Into<SpecValue>,
	{
		let mut overrides = overrides
			.into_iter()
			.map(|(k, v)| (k.into(), v.into()))
			.collect::<BTreeMap<InputName, SpecValue>>();

		let specs = node
			.specs
			.iter()
			.map(|spec| match overrides.remove(spec.name()) {
				Some(value) => spec.clone_with(value),
				None => spec.clone(),
			})
			.collect::<InputSpecs>();

		if !overrides.is_empty() {
			return Err(NodeError::UnknownOverride {
				node: node.fullname().into(),
				names: overrides.into_keys().collect(),
			});
		}

		return self.add(NodeDecl {
			func: node.func.clone(),
			name: node.name.clone(),
			namespace: node.namespace.clone(),
			specs,
			schema: node.schema.clone(),
			header_schema: node.header_schema.clone(),
			group: None,
			version: None,
			key: None,
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		routine::{routine, NodeFunc, Step},
		spec::StreamSpec,
	};
	use serde_json::json;

	fn noop() -> NodeFunc {
		NodeFunc::new(|_| routine(|_| Ok(Step::Return)))
	}

	fn decl(name: &str) -> NodeDecl {
		match NodeDecl::with_func(name, noop()) {
			Ok(x) => x.namespace("test"),
			Err(e) => panic!("{e}"),
		}
	}

	fn add(reg: &mut NodeRegistry, decl: Result<NodeDecl, crate::DeclarationError>) -> Arc<Node> {
		match decl.map_err(NodeError::from).and_then(|d| reg.add(d)) {
			Ok(x) => x,
			Err(e) => panic!("{e:?}"),
		}
	}

	fn idxs<'a>(it: impl Iterator<Item = &'a Arc<Node>>) -> Vec<NodeIdx> {
		it.map(|x| x.idx()).collect()
	}

	#[test]
	fn identity() {
		let mut reg = NodeRegistry::new();
		let a = add(&mut reg, decl("a").input("x", json!(1)));

		assert_eq!(a.fullname(), "test:a");
		assert_eq!(a.key().as_str(), format!("{}-test:a", a.specs_hash()));
		assert_eq!(a.abbrev(), format!("a.{}", &a.specs_hash()[..10]));
		assert_eq!(a.to_string(), a.key().as_str());
		assert_eq!(reg.find(a.key()).map(|x| x.idx()), Some(a.idx()));

		// Declaration order does not matter
		let b = add(
			&mut reg,
			decl("a").input("y", json!(2)).and_then(|d| d.input("x", json!(1))),
		);
		let c = add(
			&mut reg,
			decl("a").input("x", json!(1)).and_then(|d| d.input("y", json!(2))),
		);
		assert_eq!(b.key(), c.key());
		assert_ne!(a.key(), b.key());

		// Same specs, different function name
		let d = add(&mut reg, decl("d").input("x", json!(1)));
		assert_eq!(a.specs_hash(), d.specs_hash());
		assert_ne!(a.key(), d.key());
	}

	#[test]
	fn explicit_key_and_group() {
		let mut reg = NodeRegistry::new();
		let a = add(&mut reg, Ok(decl("a").key("my-key")));
		assert_eq!(a.key().as_str(), "my-key");
		assert_eq!(a.group(), Group::Never);

		let b = add(&mut reg, decl("b").foreach("x", json!([1, 2])));
		assert_eq!(b.group(), Group::Always);

		let c = add(
			&mut reg,
			decl("c")
				.foreach("x", json!([1, 2]))
				.map(|d| d.group(Group::OnDemand)),
		);
		assert_eq!(c.group(), Group::OnDemand);
	}

	#[test]
	fn edges() {
		let mut reg = NodeRegistry::new();
		let src = add(&mut reg, Ok(decl("src")));
		let left = add(&mut reg, decl("left").input("s", &src));
		let right = add(
			&mut reg,
			decl("right").input("s", StreamSpec::select(&src, "other")),
		);
		let top = add(
			&mut reg,
			decl("top")
				.input("l", &left)
				.and_then(|d| d.input("r", &right))
				.and_then(|d| d.input("s", &src)),
		);

		assert_eq!(left.deps().iter().copied().collect::<Vec<_>>(), vec![src.idx()]);
		assert_eq!(
			top.deps().iter().copied().collect::<Vec<_>>(),
			vec![src.idx(), left.idx(), right.idx()]
		);
		assert_eq!(top.alldeps(), top.deps());

		// Each consumer appears exactly once
		assert_eq!(
			idxs(reg.consumers(&src)),
			vec![left.idx(), right.idx(), top.idx()]
		);
		assert_eq!(
			idxs(reg.dependent(&src)),
			vec![left.idx(), right.idx(), top.idx()]
		);
		assert_eq!(idxs(reg.consumers(&left)), vec![top.idx()]);
		assert!(reg.consumers(&top).next().is_none());

		// No node reaches itself
		for n in reg.iter() {
			assert!(!n.deps().contains(&n.idx()));
			assert!(!n.alldeps().contains(&n.idx()));
			assert!(!idxs(reg.consumers(n)).contains(&n.idx()));
			assert!(!idxs(reg.dependent(n)).contains(&n.idx()));
		}
	}

	#[test]
	fn transitive() {
		let mut reg = NodeRegistry::new();
		let a = add(&mut reg, Ok(decl("a")));
		let b = add(&mut reg, decl("b").input("x", &a));
		let c = add(&mut reg, decl("c").input("x", &b));

		assert_eq!(
			c.alldeps().iter().copied().collect::<Vec<_>>(),
			vec![a.idx(), b.idx()]
		);
		assert_eq!(idxs(reg.consumers(&a)), vec![b.idx()]);
		assert_eq!(idxs(reg.dependent(&a)), vec![b.idx(), c.idx()]);
	}

	#[test]
	fn duplicate_edges_fail() {
		let mut reg = NodeRegistry::new();
		let a = add(&mut reg, Ok(decl("a")));
		let b = add(&mut reg, decl("b").input("x", &a));

		assert_eq!(
			reg.register_edge(a.idx(), b.idx(), EdgeKind::Consumer),
			Err(GraphError::DuplicateEdge {
				dependency: a.idx(),
				consumer: b.idx(),
				kind: EdgeKind::Consumer
			})
		);
		assert_eq!(
			reg.register_edge(a.idx(), b.idx(), EdgeKind::Dependent),
			Err(GraphError::DuplicateEdge {
				dependency: a.idx(),
				consumer: b.idx(),
				kind: EdgeKind::Dependent
			})
		);
		assert_eq!(
			reg.register_edge(b.idx(), b.idx(), EdgeKind::Consumer),
			Err(GraphError::SelfLoop { node: b.idx() })
		);

		// Failed registrations leave the graph alone
		assert_eq!(idxs(reg.consumers(&a)), vec![b.idx()]);
		assert!(reg.consumers(&b).next().is_none());
	}

	#[test]
	fn foreign_nodes_fail() {
		let mut other = NodeRegistry::new();
		let _pad = add(&mut other, Ok(decl("pad")));
		let foreign = add(&mut other, Ok(decl("foreign")));

		let mut reg = NodeRegistry::new();
		let res = decl("a")
			.input("x", &foreign)
			.map_err(NodeError::from)
			.and_then(|d| reg.add(d));

		assert!(matches!(
			res,
			Err(NodeError::Graph(GraphError::ForeignNode { .. }))
		));
		assert!(reg.is_empty());
	}

	#[test]
	fn shape_errors() {
		let mut reg = NodeRegistry::new();
		let a = add(&mut reg, Ok(decl("a")));
		let b = add(&mut reg, Ok(decl("b")));

		let res = decl("c")
			.foreach("x", &a)
			.and_then(|d| d.foreach("y", &b))
			.map_err(NodeError::from)
			.and_then(|d| reg.add(d));
		assert_eq!(
			res.map(|_| ()),
			Err(NodeError::MultipleForeachStreams {
				node: "test:c".into(),
				inputs: vec!["x".into(), "y".into()]
			})
		);

		let res = decl("d")
			.foreach("x", json!(5))
			.map_err(NodeError::from)
			.and_then(|d| reg.add(d));
		assert_eq!(
			res.map(|_| ()),
			Err(NodeError::ForeachNotIterable {
				node: "test:d".into(),
				input: "x".into()
			})
		);

		// Nothing was added, nothing was connected
		assert_eq!(reg.len(), 2);
		assert!(reg.consumers(&a).next().is_none());
	}

	#[test]
	fn clone_isolation() {
		let mut reg = NodeRegistry::new();
		let src = add(&mut reg, Ok(decl("src")));
		let alt = add(&mut reg, decl("alt").input("n", json!(0)));
		let tmpl = add(
			&mut reg,
			decl("tmpl")
				.input("s", &src)
				.and_then(|d| d.input("n", json!(1)))
				.and_then(|d| d.foreach("t", json!(["a", "b"]))),
		);

		let same = match reg.clone_node(&tmpl, [("n", json!(1))]) {
			Ok(x) => x,
			Err(e) => panic!("{e:?}"),
		};
		assert_eq!(same.key(), tmpl.key());
		assert_ne!(same.idx(), tmpl.idx());

		let other = match reg.clone_node(&tmpl, [("n", json!(2))]) {
			Ok(x) => x,
			Err(e) => panic!("{e:?}"),
		};
		assert_ne!(other.key(), tmpl.key());
		assert_eq!(other.name(), tmpl.name());
		assert_eq!(other.specs()["s"].key(), tmpl.specs()["s"].key());
		assert_eq!(other.specs()["t"].key(), tmpl.specs()["t"].key());
		assert!(other.specs()["t"].is_foreach());

		// Rebinding a stream input moves the edge
		let moved = match reg.clone_node(&tmpl, [("s", SpecValue::from(&alt))]) {
			Ok(x) => x,
			Err(e) => panic!("{e:?}"),
		};
		assert_eq!(
			moved.deps().iter().copied().collect::<Vec<_>>(),
			vec![alt.idx()]
		);
		assert_eq!(idxs(reg.consumers(&alt)), vec![moved.idx()]);
		assert_eq!(
			idxs(reg.consumers(&src)),
			vec![tmpl.idx(), same.idx(), other.idx()]
		);

		let res = reg.clone_node(&tmpl, [("nope", json!(1)), ("n", json!(3))]);
		assert_eq!(
			res.map(|_| ()),
			Err(NodeError::UnknownOverride {
				node: "test:tmpl".into(),
				names: vec!["nope".into()]
			})
		);
	}
}
