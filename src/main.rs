//! ptymux binary entry point.
//!
//! Bridges this terminal to one session: stdin bytes become session input
//! and session output is copied to stdout.

use ptymux::cli::{self, Args};
use ptymux::config::Config;
use ptymux::{logging, Multiplexer, SessionEvent};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("Try 'ptymux --help' for more information.");
            std::process::exit(2);
        }
    };

    if args.help {
        cli::print_help();
        return;
    }
    if args.version {
        cli::print_version();
        return;
    }

    let code = match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            1
        }
    };
    // A pending stdin read cannot be cancelled and would stall runtime shutdown.
    std::process::exit(code);
}

async fn run(args: Args) -> Result<i32, Box<dyn std::error::Error>> {
    let config = Config::load(&args)?;
    let _ = logging::init_with_filter(config.log_filter());

    info!("ptymux v{}", env!("CARGO_PKG_VERSION"));

    let (mux, mut events) = Multiplexer::from_config(&config)?;
    let id = mux.open_session(mux.default_geometry())?;
    info!(session = %id, "attached to session");

    let (input_tx, mut input_rx) = tokio::sync::mpsc::unbounded_channel::<Vec<u8>>();
    tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        let mut buf = [0u8; 1024];
        loop {
            match stdin.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if input_tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
    });

    let mut stdout = tokio::io::stdout();
    let mut exit = 0;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SessionEvent::Output(chunk)) => {
                    stdout.write_all(&chunk.bytes).await?;
                    stdout.flush().await?;
                }
                Some(SessionEvent::SessionEnded { session_id, cause }) => {
                    info!(session = %session_id, ?cause, "session ended");
                    if !cause.is_normal() {
                        exit = 1;
                    }
                    break;
                }
                None => break,
            },
            Some(bytes) = input_rx.recv() => {
                if let Err(e) = mux.input(id, bytes).await {
                    warn!(session = %id, error = %e, "input dropped");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    mux.shutdown().await?;
    Ok(exit)
}
