use clap::Parser;
use cnc_keel::{client::ClientHandle, config::DEFAULT_WEB_PORT};
use color_eyre::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

/// Talks to a machine served over websockets.
/// Lines read from stdin are sent as raw commands, and every message from the machine is printed.
#[derive(Parser, Debug)]
struct Args {
    /// Server address.
    #[arg(short, long, default_value = "localhost")]
    address: String,

    /// Server port.
    #[arg(short, long, default_value_t = DEFAULT_WEB_PORT)]
    port: u16,
}

async fn run(args: Args) -> Result<()> {
    let mut client = ClientHandle::new(&args.address, args.port).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => client.send(line.trim()).await?,
                None => {
                    info!("No more input");
                    return Ok(());
                }
            },
            message = client.next_message() => match message {
                Some(message) => println!("{}", message?),
                None => {
                    info!("Server closed the connection");
                    return Ok(());
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    cnc_keel::logging::init().await;

    let args = Args::parse();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C, quitting")
        }
        result = run(args) => {
            if let Err(e) = &result {
                error!(%e, "Client stopped");
            }
            return result;
        }
    }

    Ok(())
}
