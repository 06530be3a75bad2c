use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    process,
    sync::Arc,
};

use clap::Parser;
use env_logger::Builder;
use log::{error, info, warn};

use vnode_runtime::{
    command::{execute_line, Command},
    fleet::Fleet,
    system::SystemConfig,
};

/// Boots a fleet of virtual nodes and reads commands for one of them from stdin.
#[derive(Parser, Debug)]
struct Args {
    /// Path to system config. Three default nodes are used if omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Id or address of the node to control.
    #[arg(short, long, default_value = "node1")]
    node: String,
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
    let fleet = Arc::new(Fleet::boot(&config).unwrap_or_else(|err| fail(err)));
    let Some(node) = fleet.node(&args.node) else {
        fail(format!("Unknown node {}", args.node));
    };
    println!("{node}");

    let interrupted = fleet.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        println!();
        for lifecycle in interrupted.shutdown() {
            println!("{lifecycle}");
        }
        process::exit(0);
    }) {
        warn!("can't install Ctrl-C handler: {}", err);
    }

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!(">>> ");
        if let Err(err) = io::stdout().flush() {
            error!("can't write prompt: {}", err);
        }
        line.clear();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => {
                println!();
                println!("EOF detected. Stopping VM.");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                error!("can't read input: {}", err);
                break;
            }
        }
        let stop = matches!(line.parse::<Command>(), Ok(Command::Stop));
        if let Some(output) = execute_line(&node, &line) {
            println!("{output}");
        }
        if stop {
            break;
        }
    }

    for lifecycle in fleet.shutdown() {
        info!("{}", lifecycle);
    }
}
