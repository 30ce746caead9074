//! Kiln command line.
//!
//! Evaluates the components of a case file, compiling any that carry code,
//! and inspects the on-disk artifact cache.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use kiln::{CaseConfig, ComponentConfig, Kiln, KilnConfig, PatchFamily, ScalarFamily};
use kiln_build::CacheLayout;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(about = "Runtime-compiled components for case files")]
struct Args {
	/// Loader configuration (defaults to KILN_CONFIG, then the user config dir)
	#[arg(long, value_name = "PATH", global = true)]
	config: Option<PathBuf>,

	/// Verbose logging
	#[arg(short, long, global = true)]
	verbose: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Construct the components of a case and print their values
	Eval {
		case: PathBuf,
		/// Times to evaluate at
		#[arg(short, long = "time", value_name = "T", default_values_t = [0.0])]
		times: Vec<f64>,
		/// Only evaluate this component
		#[arg(short, long)]
		name: Option<String>,
		/// Faces on the sample patch handed to patch components
		#[arg(long, default_value_t = 5)]
		faces: usize,
	},
	/// Print the generated source for a component with code
	Render { case: PathBuf, name: String },
	/// Inspect the artifact cache
	Cache {
		#[command(subcommand)]
		action: CacheAction,
	},
}

#[derive(Subcommand, Debug)]
enum CacheAction {
	/// List cached units
	List,
	/// Remove every cached unit
	Clean,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();
	setup_tracing(args.verbose);

	let config = KilnConfig::load(args.config.as_deref())?;

	match args.command {
		Command::Eval { case, times, name, faces } => {
			let case = CaseConfig::load(&case)?;
			let kiln = Kiln::new(config)?;
			for (component, entry) in &case.components {
				if name.as_ref().is_some_and(|name| name != component) {
					continue;
				}
				eval(&kiln, component, entry, &times, faces)?;
			}
			let stats = kiln.stats();
			info!(compiles = stats.compiles, disk_hits = stats.disk_hits, loads = stats.loads, "Evaluation finished");
		}
		Command::Render { case, name } => {
			let case = CaseConfig::load(&case)?;
			let entry = case.components.get(&name).ok_or_else(|| format!("no component `{name}` in case"))?;
			let spec = entry.code_spec().ok_or_else(|| format!("component `{name}` has no code"))?;
			let kiln = Kiln::new(config)?;
			let source = match entry.family.as_str() {
				"scalar" => kiln.render::<ScalarFamily>(&spec)?,
				"patch" => kiln.render::<PatchFamily>(&spec)?,
				other => return Err(kiln::Error::UnknownFamily(other.to_string()).into()),
			};
			println!("{}", source.text());
		}
		Command::Cache { action } => {
			let layout = CacheLayout::new(&config.build.cache_dir);
			match action {
				CacheAction::List => {
					for entry in layout.entries()? {
						match entry.artifact_bytes {
							Some(bytes) => println!("{}  {bytes} bytes", entry.digest),
							None if entry.failed => println!("{}  failed", entry.digest),
							None => println!("{}  source only", entry.digest),
						}
					}
				}
				CacheAction::Clean => {
					let removed = layout.clean()?;
					println!("removed {removed} cached units from {}", layout.root().display());
				}
			}
		}
	}

	Ok(())
}

fn eval(kiln: &Kiln, component: &str, entry: &ComponentConfig, times: &[f64], faces: usize) -> Result<(), kiln::Error> {
	match entry.family.as_str() {
		"scalar" => {
			let scalar = kiln.create_configured::<ScalarFamily>(entry)?;
			for &t in times {
				println!("{component} t={t} {}", scalar.value(t));
			}
		}
		"patch" => {
			let patch = kiln.create_configured::<PatchFamily>(entry)?;
			let points: Vec<[f64; 3]> = (0..faces).map(|i| [0.0, (i as f64 + 0.5) / faces as f64, 0.0]).collect();
			let mut values = vec![0.0; faces];
			for &t in times {
				patch.update(t, &points, &mut values);
				println!("{component} t={t} {values:?}");
			}
		}
		other => return Err(kiln::Error::UnknownFamily(other.to_string())),
	}
	Ok(())
}

fn setup_tracing(verbose: bool) {
	use std::fs::OpenOptions;

	use tracing_subscriber::EnvFilter;
	use tracing_subscriber::prelude::*;

	let filter = || {
		EnvFilter::try_from_default_env().unwrap_or_else(|_| {
			if verbose {
				EnvFilter::new("kiln=debug,kiln_build=debug,kiln_registry=debug,info")
			} else {
				EnvFilter::new("warn,kiln::dynamic=info")
			}
		})
	};

	// KILN_LOG_DIR sends logs to a per-process file instead of stderr.
	if let Some(log_dir) = std::env::var("KILN_LOG_DIR").ok().map(PathBuf::from)
		&& std::fs::create_dir_all(&log_dir).is_ok()
	{
		let log_path = log_dir.join(format!("kiln.{}.log", std::process::id()));
		if let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_path) {
			let file_layer = tracing_subscriber::fmt::layer()
				.with_writer(file)
				.with_ansi(false)
				.with_target(true);
			tracing_subscriber::registry().with(filter()).with(file_layer).init();
			tracing::info!(path = ?log_path, "Kiln tracing initialized");
			return;
		}
	}

	tracing_subscriber::fmt()
		.with_env_filter(filter())
		.with_writer(std::io::stderr)
		.init();
}
