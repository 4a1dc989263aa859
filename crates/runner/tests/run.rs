use nodeflow_node::{
	io::{Datum, Inputs, Request, Response},
	routine::{routine, NodeFunc, Step},
	spec::StreamSpec,
	NodeDecl, NodeRegistry,
};
use nodeflow_runner::{store::StreamId, RunError, Runner, RunnerConfig};
use serde_json::{json, Value};
use std::error::Error;

type TestResult = Result<(), Box<dyn Error>>;

/// Pushes `values`, then returns
fn source(values: Vec<Value>) -> NodeFunc {
	NodeFunc::new(move |_| {
		let mut pending = values.clone().into_iter();
		routine(move |_| match pending.next() {
			Some(v) => Ok(Step::Request(Request::Push { datum: v.into() })),
			None => Ok(Step::Return),
		})
	})
}

/// Pushes one value computed from the inputs, then returns
fn compute(f: fn(&Inputs) -> Value) -> NodeFunc {
	NodeFunc::new(move |inputs| {
		let mut out = Some(f(inputs));
		routine(move |_| match out.take() {
			Some(v) => Ok(Step::Request(Request::Push { datum: v.into() })),
			None => Ok(Step::Return),
		})
	})
}

/// Pulls every value of input `s` and pushes `f` of it
fn map_stream(f: fn(&Value) -> Value) -> NodeFunc {
	NodeFunc::new(move |inputs| {
		let handle = inputs.get("s").and_then(|x| x.as_stream()).cloned();
		routine(move |resumed| {
			let Some(handle) = handle.clone() else {
				return Err("missing stream input".into());
			};

			match resumed {
				Response::Start | Response::Ack => Ok(Step::Request(Request::Pull { handle })),
				Response::Pulled(Some(Datum::Value(v))) => Ok(Step::Request(Request::Push {
					datum: f(&v).into(),
				})),
				Response::Pulled(None) => Ok(Step::Return),
				x => Err(format!("unexpected {}", x.kind()).into()),
			}
		})
	})
}

fn num(inputs: &Inputs, name: &str) -> i64 {
	inputs
		.get(name)
		.and_then(|x| x.as_value())
		.and_then(|x| x.as_i64())
		.unwrap_or(0)
}

fn values(runner: &Runner<'_>, id: StreamId) -> Vec<Value> {
	runner
		.store()
		.messages(id)
		.iter()
		.filter_map(|x| x.as_value().cloned())
		.collect()
}

/// The messages of every fork of a group stream, in fork order
fn fork_values(runner: &Runner<'_>, id: StreamId) -> Vec<Vec<Value>> {
	runner
		.store()
		.messages(id)
		.iter()
		.filter_map(|x| x.as_stream())
		.map(|h| values(runner, h.id()))
		.collect()
}

#[test]
fn pipeline() -> TestResult {
	let mut reg = NodeRegistry::new();
	let src = reg.add(NodeDecl::with_func("src", source(vec![json!(1), json!(2), json!(3)]))?)?;
	let double = reg.add(
		NodeDecl::with_func("double", map_stream(|v| json!(v.as_i64().unwrap_or(0) * 2)))?
			.input("s", &src)?,
	)?;
	let triple = reg.add(
		NodeDecl::with_func("triple", map_stream(|v| json!(v.as_i64().unwrap_or(0) * 3)))?
			.input("s", &src)?,
	)?;

	let mut runner = Runner::new(&reg, RunnerConfig::default());
	let out = runner.run(&double)?;
	assert_eq!(values(&runner, out), vec![json!(2), json!(4), json!(6)]);
	assert!(runner.store().is_closed(out));

	// The shared source is only computed once
	let src_out = runner.output(&src);
	let out = runner.run(&triple)?;
	assert_eq!(runner.output(&src), src_out);
	assert_eq!(values(&runner, out), vec![json!(3), json!(6), json!(9)]);

	return Ok(());
}

#[test]
fn plain_fanout() -> TestResult {
	let mut reg = NodeRegistry::new();
	let scale = reg.add(
		NodeDecl::with_func("scale", compute(|i| json!(num(i, "a") * num(i, "b") + num(i, "c"))))?
			.input("c", json!(1))?
			.foreach("a", json!([1, 2]))?
			.foreach("b", json!([10, 20, 30]))?,
	)?;

	let mut runner = Runner::new(&reg, RunnerConfig::default());
	let out = runner.run(&scale)?;

	assert!(runner.store().is_group(out));
	assert_eq!(
		fork_values(&runner, out),
		vec![
			vec![json!(11)],
			vec![json!(21)],
			vec![json!(31)],
			vec![json!(21)],
			vec![json!(41)],
			vec![json!(61)],
		]
	);

	let names = runner
		.store()
		.children(out)
		.map(|(name, _)| name.to_string())
		.collect::<Vec<_>>();
	assert_eq!(names.len(), 6);
	for i in 0..6 {
		assert!(names.contains(&i.to_string()));
	}

	return Ok(());
}

#[test]
fn stream_fanout() -> TestResult {
	let mut reg = NodeRegistry::new();
	let src = reg.add(NodeDecl::with_func("src", source(vec![json!(2), json!(3)]))?)?;
	let fan = reg.add(
		NodeDecl::with_func("fan", compute(|i| json!(num(i, "s") * num(i, "k"))))?
			.foreach("s", &src)?
			.foreach("k", json!([1, 100]))?,
	)?;

	let mut runner = Runner::new(&reg, RunnerConfig::default());
	let out = runner.run(&fan)?;

	assert_eq!(
		fork_values(&runner, out),
		vec![
			vec![json!(2)],
			vec![json!(200)],
			vec![json!(3)],
			vec![json!(300)],
		]
	);

	return Ok(());
}

#[test]
fn select_fork_stream() -> TestResult {
	let mut reg = NodeRegistry::new();
	let fan = reg.add(
		NodeDecl::with_func("fan", compute(|i| json!(num(i, "k") + 1)))?
			.foreach("k", json!([10, 20, 30]))?,
	)?;
	let pick = reg.add(
		NodeDecl::with_func("pick", map_stream(|v| v.clone()))?
			.input("s", StreamSpec::select(&fan, "1"))?,
	)?;
	let missing = reg.add(
		NodeDecl::with_func("missing", map_stream(|v| v.clone()))?
			.input("s", StreamSpec::select(&fan, "7"))?,
	)?;

	let mut runner = Runner::new(&reg, RunnerConfig::default());
	let out = runner.run(&pick)?;
	assert_eq!(values(&runner, out), vec![json!(21)]);

	assert!(matches!(
		runner.run(&missing),
		Err(RunError::UnknownStream { .. })
	));

	return Ok(());
}

#[test]
fn clones_share_results() -> TestResult {
	let mut reg = NodeRegistry::new();
	let tmpl = reg.add(
		NodeDecl::with_func("add", compute(|i| json!(num(i, "x") + num(i, "y"))))?
			.input("x", json!(1))?
			.input("y", json!(2))?,
	)?;
	let same = reg.clone_node(&tmpl, [("x", json!(1))])?;
	let other = reg.clone_node(&tmpl, [("x", json!(40))])?;

	let mut runner = Runner::new(&reg, RunnerConfig::default());
	let a = runner.run(&tmpl)?;
	let b = runner.run(&same)?;
	let c = runner.run(&other)?;

	assert_eq!(a, b);
	assert_ne!(a, c);
	assert_eq!(values(&runner, a), vec![json!(3)]);
	assert_eq!(values(&runner, c), vec![json!(42)]);

	return Ok(());
}

#[test]
fn step_limit() -> TestResult {
	let forever = NodeFunc::new(|_| {
		routine(|_| {
			Ok(Step::Request(Request::Push {
				datum: json!(0).into(),
			}))
		})
	});

	let mut reg = NodeRegistry::new();
	let node = reg.add(NodeDecl::with_func("forever", forever)?)?;

	let config = RunnerConfig {
		max_steps: 5,
		..Default::default()
	};
	let mut runner = Runner::new(&reg, config);

	match runner.run(&node) {
		Err(RunError::StepLimit { max_steps, .. }) => assert_eq!(max_steps, 5),
		x => panic!("expected step limit, got {x:?}"),
	}

	return Ok(());
}

#[test]
fn routine_errors_propagate() -> TestResult {
	let mut reg = NodeRegistry::new();
	let src = reg.add(NodeDecl::with_func("src", source(vec![json!(1)]))?)?;

	// `s` is a plain value, so the routine fails on its first resume
	let bad = reg.add(NodeDecl::with_func("bad", map_stream(|v| v.clone()))?.input("s", json!(1))?)?;
	let good = reg.add(NodeDecl::with_func("good", map_stream(|v| v.clone()))?.input("s", &src)?)?;

	let mut runner = Runner::new(&reg, RunnerConfig::default());
	assert!(matches!(runner.run(&bad), Err(RunError::Invocation(_))));
	let out = runner.run(&good)?;
	assert_eq!(values(&runner, out), vec![json!(1)]);

	return Ok(());
}

#[test]
fn node_without_output() -> TestResult {
	// Returns right away unless `enabled`
	let maybe = NodeFunc::new(|inputs| {
		let enabled = inputs
			.get("enabled")
			.and_then(|x| x.as_value())
			.and_then(Value::as_bool)
			.unwrap_or(false);
		let mut out = enabled.then(|| json!("on"));
		routine(move |_| match out.take() {
			Some(v) => Ok(Step::Request(Request::Push { datum: v.into() })),
			None => Ok(Step::Return),
		})
	});

	let mut reg = NodeRegistry::new();
	let off = reg.add(NodeDecl::with_func("maybe", maybe)?.input("enabled", json!(false))?)?;
	let on = reg.clone_node(&off, [("enabled", json!(true))])?;
	let downstream = reg.add(
		NodeDecl::with_func("down", map_stream(|v| v.clone()))?.input("s", &off)?,
	)?;

	let mut runner = Runner::new(&reg, RunnerConfig::default());
	let out = runner.run(&off)?;
	assert!(values(&runner, out).is_empty());
	assert!(runner.store().is_closed(out));

	let out = runner.run(&downstream)?;
	assert!(values(&runner, out).is_empty());

	let out = runner.run(&on)?;
	assert_eq!(values(&runner, out), vec![json!("on")]);

	return Ok(());
}

#[test]
fn forks_follow_declaration_order() -> TestResult {
	fn label(i: &Inputs) -> Value {
		let s = |n: &str| {
			i.get(n)
				.and_then(|x| x.as_value())
				.and_then(Value::as_str)
				.unwrap_or("")
				.to_owned()
		};
		json!(format!("{}/{}", s("zone"), s("axis")))
	}

	let mut reg = NodeRegistry::new();
	let fan = reg.add(
		NodeDecl::with_func("fan", compute(label))?
			.foreach("zone", json!(["z1", "z2"]))?
			.foreach("axis", json!(["a1", "a2"]))?,
	)?;
	let pick = reg.add(
		NodeDecl::with_func("pick", map_stream(|v| v.clone()))?
			.input("s", StreamSpec::select(&fan, "1"))?,
	)?;

	let mut runner = Runner::new(&reg, RunnerConfig::default());
	let out = runner.run(&pick)?;
	assert_eq!(values(&runner, out), vec![json!("z1/a2")]);

	let out = runner.run(&fan)?;
	assert_eq!(
		fork_values(&runner, out),
		vec![
			vec![json!("z1/a1")],
			vec![json!("z1/a2")],
			vec![json!("z2/a1")],
			vec![json!("z2/a2")],
		]
	);

	return Ok(());
}

#[test]
fn foreign_node_is_rejected() -> TestResult {
	let mut other = NodeRegistry::new();
	let _pad = other.add(NodeDecl::with_func("pad", source(vec![]))?)?;
	let foreign = other.add(NodeDecl::with_func("foreign", source(vec![json!(1)]))?)?;

	let mut reg = NodeRegistry::new();
	let _a = reg.add(NodeDecl::with_func("a", source(vec![]))?)?;
	let _b = reg.add(NodeDecl::with_func("b", source(vec![]))?)?;

	let mut runner = Runner::new(&reg, RunnerConfig::default());
	match runner.run(&foreign) {
		Err(RunError::UnknownNode { idx }) => assert_eq!(idx, foreign.idx()),
		x => panic!("expected unknown node, got {x:?}"),
	}
	assert!(runner.output(&foreign).is_none());

	return Ok(());
}
