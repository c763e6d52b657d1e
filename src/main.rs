use clap::Parser;
use cnc_keel::{
    cli, config::Protocol, gcode, logging, machine::Machine, server,
    serial::serial_port::SerialPortBuilder, terminal,
};
use color_eyre::{
    eyre::{eyre, WrapErr},
    Result,
};
use tokio::io::{AsyncBufReadExt, BufReader};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use tracing::{debug, error, info, Instrument};

/// Read g-code lines from the operator and send them to the machine.
///
/// In json mode each line is checked and wrapped,
/// and an unrecognized command stops everything.
async fn operate(machine: Machine, protocol: Protocol) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    eprintln!("Please, enter g-code lines below:");

    while let Some(line) = lines
        .next_line()
        .await
        .wrap_err("Could not read operator input")?
    {
        let command = match protocol {
            Protocol::Passthrough => line.trim().to_owned(),
            Protocol::Json => match gcode::sanitize(&line)? {
                Some(gcode) => gcode::wrap(&gcode),
                None => continue,
            },
        };

        debug!(%command, "From operator");
        machine.send(command).await?;
    }

    info!("No more operator input");

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = cli::Cli::parse();

    if let Some(command) = cli.command {
        cli::handle_command(command);

        return Ok(());
    }

    logging::init().await;

    let config = cli.to_config()?;
    config.validate()?;
    debug!(?config, "Running with");

    let port = SerialPortBuilder::new(&config.device)
        .set_baud(config.baud)
        .build()?;
    info!(device = %config.device, baud = config.baud, "Port opened");

    let (machine, mut session) = Machine::new(port, (&config).into());

    tokio::spawn(terminal::print(tokio::io::stdout(), machine.subscribe()));

    if let Some(web) = &config.web {
        let machine = machine.clone();
        let port = web.port;
        tokio::spawn(
            async move {
                if let Err(e) = server::run_on_port(machine, port).await {
                    error!(%e, "Web server stopped");
                }
            }
            .instrument(tracing::info_span!("Web")),
        );
    }

    if config.protocol == Protocol::Json {
        machine.send(gcode::REQUEST_STATUS_REPORT).await?;
    }

    #[cfg(unix)]
    let mut hangup = signal(SignalKind::hangup())?;

    #[cfg(unix)]
    let hangup = hangup.recv();

    #[cfg(not(unix))]
    let hangup = std::future::pending::<Option<()>>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C, quitting")
        }
        _ = hangup => {
            info!("Told to hang up, quitting")
        }
        session_result = &mut session => {
            match session_result? {
                Ok(()) => info!("Machine session over"),
                Err(e) => {
                    error!(%e, "Machine session failed");
                    return Err(e.into());
                }
            }
        }
        operated = operate(machine, config.protocol) => {
            if let Err(e) = operated {
                error!(%e, "Stopping");
                return Err(e);
            }

            // Stdin closed, let the commands in flight finish.
            match session.await? {
                Ok(()) => info!("Machine session over"),
                Err(e) => return Err(eyre!("Machine session failed: {e}")),
            }
        }
    }

    logging::shutdown();

    Ok(())
}
