//! Console client: reads moves from stdin and prints the board to stdout.
//!
//! Run with: `cargo run -p tttp-client -- --server 127.0.0.1`

use std::io::Write;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tttp_client::{BoardRender, GameResult, MoveSource, TttpClient};
use tttp_config::{ClientArgs, Config, ConfigError};
use tttp_game::Board;

struct ConsoleMoves {
    lines: Lines<BufReader<Stdin>>,
}

impl MoveSource for ConsoleMoves {
    async fn next_move(&mut self, _board: &Board) -> Option<i32> {
        loop {
            print!("MOVE ");
            let _ = std::io::stdout().flush();

            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(e) => {
                    tracing::warn!("Reading stdin failed: {e}");
                    return None;
                }
            };
            match line.trim() {
                "q" | "quit" => return None,
                text => match text.parse() {
                    Ok(cell) => return Some(cell),
                    Err(_) => println!("Enter a cell number from 0 to 8, or q to quit"),
                },
            }
        }
    }
}

struct ConsoleBoard;

impl BoardRender for ConsoleBoard {
    fn render(&mut self, board: &Board) {
        println!("\n{board}");
    }

    fn status(&mut self, text: &str) {
        println!("{text}");
    }
}

#[tokio::main]
async fn main() {
    let args = ClientArgs::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tttp_log::init_logging(Some(&config));
    match &args.config {
        Some(dir) => tracing::debug!("Using config {}", Config::file_path(dir).display()),
        None => tracing::debug!("No config directory given, using defaults and flags"),
    }

    let endpoint = config.client.server_endpoint();
    let mut client = match TttpClient::connect(&endpoint).await {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let mut moves = ConsoleMoves {
        lines: BufReader::new(tokio::io::stdin()).lines(),
    };
    match client.play(&mut moves, &mut ConsoleBoard).await {
        Ok(GameResult::Quit) => println!("You left the game"),
        Ok(result) => tracing::info!("Game over: {result:?}"),
        Err(e) => {
            eprintln!("Game aborted: {e}");
            std::process::exit(1);
        }
    }
}

/// Defaults, then `config.ron` when `--config` is given, then CLI flags.
fn load_config(args: &ClientArgs) -> Result<Config, ConfigError> {
    let mut config = match &args.config {
        Some(dir) => Config::load_or_create(dir)?,
        None => Config::default(),
    };
    config.apply_client_overrides(args);
    Ok(config)
}
