use std::{io::Write, path::PathBuf, process, sync::Arc};

use clap::Parser;
use env_logger::Builder;
use vnode_runtime::{fleet::Fleet, script::Script, system::SystemConfig};

/// Replays a command script against a fleet of nodes.
#[derive(Parser, Debug)]
struct Args {
    /// Path to script.
    #[arg(short, long)]
    script: PathBuf,

    /// Path to system config. Three default nodes are used if omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to file with results.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of threads.
    #[arg(long, default_value_t = std::thread::available_parallelism().map_or(1, |n| n.get()))]
    threads: usize,
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("{message}");
    process::exit(1)
}

fn main() {
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => SystemConfig::from_yaml(path).unwrap_or_else(|err| fail(err)),
        None => SystemConfig::default(),
    };
    let script = Script::from_yaml(&args.script).unwrap_or_else(|err| fail(err));

    let fleet = Arc::new(Fleet::boot(&config).unwrap_or_else(|err| fail(err)));
    let results = script.run(fleet.clone(), args.threads);
    fleet.shutdown();

    for result in &results {
        for step in &result.steps {
            println!("[{}] >>> {}", result.node, step.command);
            println!("{}", step.output);
        }
    }

    if let Some(output) = args.output {
        let json = serde_json::to_string_pretty(&results).unwrap_or_else(|err| fail(err));
        std::fs::write(&output, json)
            .unwrap_or_else(|err| fail(format!("can't write results to {}: {err}", output.display())));
    }
}
