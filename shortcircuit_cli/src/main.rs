mod args;

use std::fs;
use std::io::{self, BufRead};
use std::process::ExitCode;

use clap::Parser;
use shortcircuit_world::{load_board, save_board, Message, World};
use tracing::{error, info};

use args::Args;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "run failed");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let board_text = fs::read_to_string(&args.board)?;
    let grid = load_board(&board_text);
    let mut world = World::with_grids(vec![grid]);

    if let Some(script_path) = &args.script {
        for line in read_lines(script_path)? {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let message: Message = serde_json::from_str(&line)?;
            world.submit(message);
        }
        let quit = world.process_queue()?;
        info!(quit, "script finished");
    }

    if args.print {
        println!("{}", save_board(&world.grids()[0]));
    }

    Ok(())
}

fn read_lines(path: &str) -> io::Result<impl Iterator<Item = io::Result<String>>> {
    let file = fs::File::open(path)?;
    Ok(io::BufReader::new(file).lines())
}
