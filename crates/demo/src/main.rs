use nodeflow_node::{
	io::{Datum, Inputs, NodeLogger, Request, Response},
	node_decl,
	routine::{routine, Routine, Step},
	Node, NodeError, NodeRegistry,
};
use nodeflow_runner::{config::ENV_PREFIX, Runner, RunnerConfig};
use nodeflow_util::{load_env, LoadedEnv};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

//
// MARK: Nodes
//

/// Emits a few sensor readings
fn readings(_: &Inputs) -> Box<dyn Routine> {
	let mut pending = vec![
		json!({ "sensor": "gps", "value": 1.5 }),
		json!({ "sensor": "imu", "value": 0.25 }),
		json!({ "sensor": "gps", "value": 2.0 }),
		json!({ "sensor": "imu", "value": 0.5 }),
		json!({ "sensor": "gps", "value": 3.5 }),
	]
	.into_iter();

	routine(move |_| match pending.next() {
		Some(v) => Ok(Step::Request(Request::Push { datum: v.into() })),
		None => Ok(Step::Return),
	})
}

/// Forwards the readings of one sensor, scaled by `scale`
fn select(inputs: &Inputs) -> Box<dyn Routine> {
	let stream = inputs.get("readings").and_then(|x| x.as_stream()).cloned();
	let sensor = inputs.get("sensor").and_then(|x| x.as_value()).cloned();
	let scale = inputs
		.get("scale")
		.and_then(|x| x.as_value())
		.and_then(|x| x.as_f64())
		.unwrap_or(1.0);
	let mut logger: Option<NodeLogger> = None;

	routine(move |resumed| {
		let Some(handle) = stream.clone() else {
			return Err("`readings` is not a stream".into());
		};

		match resumed {
			Response::Start => Ok(Step::Request(Request::GetLogger)),
			Response::Logger(log) => {
				log.debug(format_args!("selecting {sensor:?}"));
				logger = Some(log);
				Ok(Step::Request(Request::Pull { handle }))
			}

			Response::Ack => Ok(Step::Request(Request::Pull { handle })),
			Response::Pulled(Some(Datum::Value(v))) => {
				if v.get("sensor") != sensor.as_ref() {
					return Ok(Step::Request(Request::Pull { handle }));
				}

				let value = v.get("value").and_then(Value::as_f64).unwrap_or(0.0);
				if let Some(log) = &logger {
					log.noisy(format_args!("got {value}"));
				}
				Ok(Step::Request(Request::Push {
					datum: json!(value * scale).into(),
				}))
			}
			Response::Pulled(None) => {
				if let Some(log) = &logger {
					log.debug("stream exhausted");
				}
				Ok(Step::Return)
			}

			x => Err(format!("unexpected {}", x.kind()).into()),
		}
	})
}

/// Pushes whether one reading exceeds `threshold`
fn exceeds(inputs: &Inputs) -> Box<dyn Routine> {
	let value = inputs
		.get("reading")
		.and_then(|x| x.as_value())
		.and_then(|x| x.get("value"))
		.and_then(Value::as_f64);
	let threshold = inputs
		.get("threshold")
		.and_then(|x| x.as_value())
		.and_then(Value::as_f64);
	let mut out = Some(json!(value.zip(threshold).map(|(v, t)| v > t)));

	routine(move |_| match out.take() {
		Some(v) => Ok(Step::Request(Request::Push { datum: v.into() })),
		None => Ok(Step::Return),
	})
}

//
// MARK: Main
//

/// Build the sample graph, returning the nodes we want to run
fn build(registry: &mut NodeRegistry) -> Result<Vec<Arc<Node>>, NodeError> {
	let source = registry.add(node_decl!("readings", readings)?)?;

	// One fork per reading and threshold
	let alerts = registry.add(
		node_decl!("exceeds", exceeds)?
			.foreach("reading", &source)?
			.foreach("threshold", json!([1.0, 3.0]))?,
	)?;

	let per_sensor = registry.add(
		node_decl!("select", select)?
			.input("readings", &source)?
			.input("scale", json!(1.0))?
			.foreach("sensor", json!(["gps", "imu"]))?
			.schema("reading"),
	)?;

	// Same template, another scale
	let scaled = registry.clone_node(&per_sensor, [("scale", json!(10.0))])?;

	return Ok(vec![alerts, scaled]);
}

fn main() {
	let config_res = match load_env::<RunnerConfig>(ENV_PREFIX) {
		Ok(x) => x,

		#[expect(clippy::print_stdout)]
		Err(err) => {
			println!("Error while loading .env: {err}");
			std::process::exit(1);
		}
	};

	tracing_subscriber::fmt()
		.with_env_filter(config_res.get_config().loglevel.get_config())
		.without_time()
		.with_ansi(true)
		.init();

	// Do this now, logging wasn't available earlier
	match &config_res {
		LoadedEnv::FoundFile { config, path } => {
			info!(message = "Loaded config from .env", ?path, ?config);
		}
		LoadedEnv::OnlyVars(config) => {
			info!(
				message = "No `.env` found, loaded config from environment",
				?config
			);
		}
	};

	let config = config_res.into_config();
	let mut registry = NodeRegistry::new();
	let targets = match build(&mut registry) {
		Ok(x) => x,
		Err(e) => {
			error!(message = "Could not build graph", error = ?e);
			std::process::exit(1);
		}
	};

	for n in registry.iter() {
		info!(message = "Node", node = ?n, key = %n.key());
	}

	let mut runner = Runner::new(&registry, config);
	for node in targets {
		let out = match runner.run(&node) {
			Ok(x) => x,
			Err(e) => {
				error!(message = "Run failed", node = %node.abbrev(), error = ?e);
				std::process::exit(1);
			}
		};

		for (name, stream) in runner.store().children(out) {
			let values = runner
				.store()
				.messages(stream)
				.iter()
				.filter_map(|x| x.as_value())
				.map(|x| x.to_string())
				.collect::<Vec<_>>();

			info!(
				message = "Fork finished",
				node = %node.abbrev(),
				fork = %name,
				values = %values.join(", ")
			);
		}
	}
}
