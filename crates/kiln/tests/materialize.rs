#![allow(unused_crate_dependencies)]

use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Barrier};

use kiln::{
	AcquireMode, ArtifactState, CaseConfig, ComponentArgs, ErrorKind, Kiln, KilnConfig, PatchFamily, ScalarFamily,
	ScalarProvider,
};
use kiln_build::{BuildConfig, BuildFailure};
use kiln_codegen::CodeSpec;
use kiln_registry::Origin;

fn kiln(cache: &Path) -> Kiln {
	Kiln::new(KilnConfig {
		build: BuildConfig::default().with_cache_dir(cache),
		..KilnConfig::default()
	})
	.expect("kiln initializes")
}

fn no_options() -> toml::Table {
	toml::Table::new()
}

#[test]
fn test_fragment_becomes_component() {
	let tmp = tempfile::tempdir().unwrap();
	let kiln = kiln(tmp.path());

	let spec = CodeSpec::new("answer", "return 42;");
	let answer = kiln.materialize::<ScalarFamily>(&spec, &no_options()).unwrap();
	assert_eq!(answer.value(0.0), 42.0);

	let source = kiln.render::<ScalarFamily>(&spec).unwrap();
	assert_eq!(kiln.cache().state(source.digest()), ArtifactState::Loaded);
	assert_eq!(kiln.registry().origin::<ScalarFamily>(&source.type_name()), Some(Origin::Artifact(source.digest().to_string())));
}

#[test]
fn test_include_and_local_code() {
	let tmp = tempfile::tempdir().unwrap();
	let kiln = kiln(tmp.path());

	let spec = CodeSpec::new("shaped", "return sq(t) + sqrt(4.0);")
		.with_include("#include <math.h>")
		.with_local_code("static double sq(double x) { return x * x; }");
	let shaped = kiln.materialize::<ScalarFamily>(&spec, &no_options()).unwrap();
	assert_eq!(shaped.value(3.0), 11.0);
}

#[test]
fn test_identical_code_shares_one_artifact() {
	let tmp = tempfile::tempdir().unwrap();
	let kiln = kiln(tmp.path());

	let a = CodeSpec::new("inletA", "return 2.0 * t;");
	let b = CodeSpec::new("inletB", "return 2.0 * t;");
	let first = kiln.materialize::<ScalarFamily>(&a, &no_options()).unwrap();
	let second = kiln.materialize::<ScalarFamily>(&b, &no_options()).unwrap();
	assert_eq!(first.value(2.0), 4.0);
	assert_eq!(second.value(5.0), 10.0);

	let stats = kiln.stats();
	assert_eq!(stats.compiles, 1);
	assert_eq!(stats.loads, 1);

	let source_a = kiln.render::<ScalarFamily>(&a).unwrap();
	let source_b = kiln.render::<ScalarFamily>(&b).unwrap();
	assert_eq!(source_a.digest(), source_b.digest());
	assert_ne!(source_a.type_name(), source_b.type_name());
	assert!(kiln.registry().contains::<ScalarFamily>(&source_a.type_name()));
	assert!(kiln.registry().contains::<ScalarFamily>(&source_b.type_name()));
	assert_eq!(kiln.cache().ref_count(source_a.digest()), 2);

	drop(first);
	assert_eq!(kiln.cache().ref_count(source_a.digest()), 1);
}

#[test]
fn test_concurrent_requests_build_once() {
	let tmp = tempfile::tempdir().unwrap();
	let kiln = kiln(tmp.path());
	let spec = CodeSpec::new("shared", "return t + 1.0;");
	let barrier = Barrier::new(8);

	let values: Vec<f64> = std::thread::scope(|scope| {
		let handles: Vec<_> = (0..8)
			.map(|i| {
				let (kiln, spec, barrier) = (&kiln, &spec, &barrier);
				scope.spawn(move || {
					barrier.wait();
					let instance = kiln.materialize::<ScalarFamily>(spec, &toml::Table::new()).unwrap();
					instance.value(f64::from(i))
				})
			})
			.collect();
		handles.into_iter().map(|handle| handle.join().unwrap()).collect()
	});

	assert_eq!(values, (1..=8).map(f64::from).collect::<Vec<_>>());
	let stats = kiln.stats();
	assert_eq!(stats.compiles, 1);
	assert_eq!(stats.loads, 1);
}

#[test]
fn test_concurrent_failures_share_one_diagnostic() {
	let tmp = tempfile::tempdir().unwrap();
	let kiln = kiln(tmp.path());
	let spec = CodeSpec::new("broken", "return 42 this is not c;");
	let barrier = Barrier::new(4);

	let messages: Vec<String> = std::thread::scope(|scope| {
		let handles: Vec<_> = (0..4)
			.map(|_| {
				let (kiln, spec, barrier) = (&kiln, &spec, &barrier);
				scope.spawn(move || {
					barrier.wait();
					match kiln.materialize::<ScalarFamily>(spec, &toml::Table::new()) {
						Ok(_) => panic!("broken code compiled"),
						Err(error) => error.to_string(),
					}
				})
			})
			.collect();
		handles.into_iter().map(|handle| handle.join().unwrap()).collect()
	});

	assert!(messages.windows(2).all(|pair| pair[0] == pair[1]));
	assert_eq!(kiln.stats().compiles, 1);
}

#[test]
fn test_compile_error_is_sticky_until_retry() {
	let tmp = tempfile::tempdir().unwrap();
	let kiln = kiln(tmp.path());
	let spec = CodeSpec::new("typo", "return t +;");

	let error = kiln.materialize::<ScalarFamily>(&spec, &no_options()).err().unwrap();
	assert_eq!(error.kind(), ErrorKind::CompileError);
	let kiln::Error::Artifact(kiln::ArtifactFailure::Build(BuildFailure::Compile { diagnostics, .. })) = &error else {
		panic!("expected compile diagnostics, got {error:?}");
	};
	assert!(diagnostics.contains("error"), "{diagnostics}");

	let source = kiln.render::<ScalarFamily>(&spec).unwrap();
	assert!(!kiln.cache().driver().layout().artifact_path(source.digest()).exists());
	assert_eq!(kiln.cache().state(source.digest()), ArtifactState::Failed);

	let again = kiln.materialize::<ScalarFamily>(&spec, &no_options()).err().unwrap();
	assert_eq!(again.kind(), ErrorKind::CompileError);
	assert_eq!(kiln.stats().compiles, 1);

	kiln.materialize_with::<ScalarFamily>(&spec, &no_options(), AcquireMode::Retry)
		.err()
		.unwrap();
	assert_eq!(kiln.stats().compiles, 2);
}

#[test]
fn test_instances_keep_artifact_loaded() {
	let tmp = tempfile::tempdir().unwrap();
	let kiln = kiln(tmp.path());
	let spec = CodeSpec::new("held", "return -t;");
	let source = kiln.render::<ScalarFamily>(&spec).unwrap();
	let digest = source.digest().clone();

	let held = kiln.materialize::<ScalarFamily>(&spec, &no_options()).unwrap();
	assert_eq!(kiln.evict_idle(), 0);
	assert_eq!(kiln.cache().state(&digest), ArtifactState::Loaded);
	assert_eq!(held.value(1.5), -1.5);

	drop(held);
	assert_eq!(kiln.cache().ref_count(&digest), 0);
	assert_eq!(kiln.cache().state(&digest), ArtifactState::Loaded);

	assert_eq!(kiln.evict_idle(), 1);
	assert_eq!(kiln.cache().state(&digest), ArtifactState::Unloaded);
	assert!(!kiln.registry().contains::<ScalarFamily>(&source.type_name()));
	assert_eq!(kiln.stats().unloads, 1);

	let again = kiln.materialize::<ScalarFamily>(&spec, &no_options()).unwrap();
	assert_eq!(again.value(2.0), -2.0);
	let stats = kiln.stats();
	assert_eq!(stats.compiles, 1);
	assert_eq!(stats.disk_hits, 1);
	assert_eq!(stats.loads, 2);
}

#[test]
fn test_factory_from_evicted_load_refuses_to_construct() {
	let tmp = tempfile::tempdir().unwrap();
	let kiln = kiln(tmp.path());
	let spec = CodeSpec::new("five", "return 5.0;");
	let type_name = kiln.render::<ScalarFamily>(&spec).unwrap().type_name();

	let fresh = kiln.materialize::<ScalarFamily>(&spec, &no_options()).unwrap();
	assert_eq!(fresh.value(0.0), 5.0);
	let stale = kiln.registry().factory::<ScalarFamily>(&type_name).unwrap();
	drop(fresh);
	assert_eq!(kiln.evict_idle(), 1);

	let others: Vec<_> = (0..4)
		.map(|i| {
			kiln.materialize::<ScalarFamily>(&CodeSpec::new(format!("other{i}"), format!("return {i}.5;")), &no_options())
				.unwrap()
		})
		.collect();
	let reloaded = kiln.materialize::<ScalarFamily>(&spec, &no_options()).unwrap();
	assert_eq!(reloaded.value(0.0), 5.0);
	assert_eq!(others[3].value(0.0), 3.5);

	let error = stale(&ComponentArgs::new(type_name.clone(), no_options())).err().expect("stale factory must not construct");
	assert!(error.to_string().contains("no longer loaded"), "{error}");

	let current = kiln.registry().factory::<ScalarFamily>(&type_name).unwrap();
	assert_eq!(current(&ComponentArgs::new(type_name, no_options())).unwrap().value(0.0), 5.0);
}

#[test]
fn test_evicted_slots_are_pruned() {
	let tmp = tempfile::tempdir().unwrap();
	let kiln = kiln(tmp.path());
	for i in 0..3 {
		let spec = CodeSpec::new(format!("brief{i}"), format!("return {i};"));
		drop(kiln.materialize::<ScalarFamily>(&spec, &no_options()).unwrap());
	}
	assert_eq!(kiln.cache().slot_count(), 3);
	assert_eq!(kiln.evict_idle(), 3);
	assert_eq!(kiln.cache().slot_count(), 0);
}

#[test]
fn test_include_dirs_are_part_of_the_cache_key() {
	let tmp = tempfile::tempdir().unwrap();
	let cache = tmp.path().join("cache");
	let with_header = |name: &str, value: &str| {
		let dir = tmp.path().join(name);
		std::fs::create_dir_all(&dir).unwrap();
		std::fs::write(dir.join("val.h"), format!("#define VAL {value}\n")).unwrap();
		Kiln::new(KilnConfig {
			build: BuildConfig {
				include_dirs: vec![dir],
				..BuildConfig::default().with_cache_dir(&cache)
			},
			..KilnConfig::default()
		})
		.unwrap()
	};
	let spec = CodeSpec::new("fromHeader", "return VAL;").with_include("#include \"val.h\"");

	let first = with_header("a", "1.0");
	assert_eq!(first.materialize::<ScalarFamily>(&spec, &no_options()).unwrap().value(0.0), 1.0);

	let second = with_header("b", "2.0");
	assert_ne!(
		first.render::<ScalarFamily>(&spec).unwrap().digest(),
		second.render::<ScalarFamily>(&spec).unwrap().digest()
	);
	assert_eq!(second.materialize::<ScalarFamily>(&spec, &no_options()).unwrap().value(0.0), 2.0);
	assert_eq!(second.stats().compiles, 1);
}

#[test]
fn test_instance_outlives_loader() {
	let tmp = tempfile::tempdir().unwrap();
	let kiln = kiln(tmp.path());
	let survivor = kiln.materialize::<ScalarFamily>(&CodeSpec::new("late", "return 7.0;"), &no_options()).unwrap();
	drop(kiln);
	assert_eq!(survivor.value(0.0), 7.0);
}

#[test]
fn test_mismatched_artifact_fails_verification() {
	let tmp = tempfile::tempdir().unwrap();
	let kiln = kiln(tmp.path());
	let a = CodeSpec::new("a", "return 1.0;");
	let b = CodeSpec::new("b", "return 2.0;");
	let source_a = kiln.render::<ScalarFamily>(&a).unwrap();
	let source_b = kiln.render::<ScalarFamily>(&b).unwrap();

	// Build b, then plant its library where a's artifact belongs.
	drop(kiln.materialize::<ScalarFamily>(&b, &no_options()).unwrap());
	let layout = kiln.cache().driver().layout();
	let planted = layout.artifact_path(source_a.digest());
	std::fs::create_dir_all(layout.unit_dir(source_a.digest())).unwrap();
	std::fs::copy(layout.artifact_path(source_b.digest()), &planted).unwrap();

	let error = kiln.materialize::<ScalarFamily>(&a, &no_options()).err().unwrap();
	assert_eq!(error.kind(), ErrorKind::VerificationFailed, "{error}");
	assert!(!planted.exists());
	assert_eq!(kiln.cache().state(source_a.digest()), ArtifactState::Failed);

	let rebuilt = kiln.materialize_with::<ScalarFamily>(&a, &no_options(), AcquireMode::Retry).unwrap();
	assert_eq!(rebuilt.value(0.0), 1.0);
}

#[test]
fn test_unknown_type_lists_known_names() {
	let tmp = tempfile::tempdir().unwrap();
	let kiln = kiln(tmp.path());
	let case: CaseConfig = toml::from_str("[components.x]\nfamily = \"scalar\"\ntype = \"nope\"\n").unwrap();

	let error = kiln.create_configured::<ScalarFamily>(&case.components["x"]).err().unwrap();
	assert_eq!(error.kind(), ErrorKind::UnknownType);
	assert!(error.to_string().contains("constant"), "{error}");
}

#[test]
fn test_case_mixes_builtin_and_dynamic_entries() {
	let tmp = tempfile::tempdir().unwrap();
	let kiln = kiln(tmp.path());
	let case: CaseConfig = toml::from_str(
		r#"
		[components.base]
		family = "scalar"
		type = "linearRamp"
		start = 1.0
		slope = 0.5

		[components.wall]
		family = "patch"
		type = "uniformFixedValue"
		value = 300

		[components.inlet]
		family = "patch"
		type = "shearInlet"
		code = """
		    for (size_t i = 0; i < n; ++i) {
		        values[i] = points[3 * i + 1] * t;
		    }
		"""
		"#,
	)
	.unwrap();

	let base = kiln.create_configured::<ScalarFamily>(&case.components["base"]).unwrap();
	assert_eq!(base.value(4.0), 3.0);

	let points = [[0.0, 1.0, 0.0], [0.0, 2.0, 0.0], [0.0, 3.0, 0.0]];
	let mut values = [0.0; 3];
	let wall = kiln.create_configured::<PatchFamily>(&case.components["wall"]).unwrap();
	wall.update(0.0, &points, &mut values);
	assert_eq!(values, [300.0; 3]);

	let inlet = kiln.create_configured::<PatchFamily>(&case.components["inlet"]).unwrap();
	inlet.update(2.0, &points, &mut values);
	assert_eq!(values, [2.0, 4.0, 6.0]);

	let wrong = kiln.create_configured::<ScalarFamily>(&case.components["wall"]).err().unwrap();
	assert_eq!(wrong.kind(), ErrorKind::Config);
}

#[test]
fn test_verbose_code_traces_lifecycle() {
	#[derive(Clone, Default)]
	struct Capture(Arc<parking_lot::Mutex<Vec<u8>>>);

	impl Write for Capture {
		fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
			self.0.lock().extend_from_slice(buf);
			Ok(buf.len())
		}

		fn flush(&mut self) -> std::io::Result<()> {
			Ok(())
		}
	}

	let capture = Capture::default();
	let writer = capture.clone();
	let subscriber = tracing_subscriber::fmt()
		.with_writer(move || writer.clone())
		.with_ansi(false)
		.with_max_level(tracing::Level::INFO)
		.finish();

	let tmp = tempfile::tempdir().unwrap();
	tracing::subscriber::with_default(subscriber, || {
		let kiln = kiln(tmp.path());
		let spec = CodeSpec::new("chatty", "return t;").with_verbose(true);
		let chatty = kiln.materialize::<ScalarFamily>(&spec, &no_options()).unwrap();
		assert_eq!(chatty.value(1.0), 1.0);
		drop(chatty);
		kiln.evict_idle();
	});

	let output = String::from_utf8(capture.0.lock().clone()).unwrap();
	for needle in ["register chatty_", "construct chatty_", "value chatty_", "destroy chatty_", "unloading scalar digest"] {
		assert!(output.contains(needle), "missing `{needle}` in:\n{output}");
	}
}

#[test]
fn test_duplicate_type_across_origins_is_rejected() {
	let tmp = tempfile::tempdir().unwrap();
	let kiln = kiln(tmp.path());
	let spec = CodeSpec::new("taken", "return 0.0;");
	let type_name = kiln.render::<ScalarFamily>(&spec).unwrap().type_name();

	let factory: kiln_registry::Factory<ScalarFamily> =
		Arc::new(|_: &kiln::ComponentArgs| -> Result<Box<dyn ScalarProvider>, kiln_registry::ConstructError> {
			Err(kiln_registry::ConstructError::new("placeholder"))
		});
	kiln.registry()
		.register::<ScalarFamily>(type_name, Origin::Runtime, factory)
		.unwrap();

	let error = kiln.materialize::<ScalarFamily>(&spec, &no_options()).err().unwrap();
	assert_eq!(error.kind(), ErrorKind::DuplicateType);
}
