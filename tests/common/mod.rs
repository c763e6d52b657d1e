#![allow(dead_code)]

use std::time::Duration;

use cnc_keel::{
    config::Protocol,
    error::Error,
    machine::{EngineOptions, Machine},
    message::Message,
    pubsub::Subscription,
};
use color_eyre::{eyre::eyre, Result};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf},
    task::JoinHandle,
    time::timeout,
};

const PATIENCE: Duration = Duration::from_secs(5);

/// The far end of a machine connection, played by the test.
pub struct Controller {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl Controller {
    /// The next command line the machine wrote.
    pub async fn expect_line(&mut self) -> Result<String> {
        timeout(PATIENCE, self.lines.next_line())
            .await??
            .ok_or_else(|| eyre!("Machine closed the connection"))
    }

    /// Check nothing is written for a while.
    pub async fn expect_silence(&mut self, duration: Duration) -> Result<()> {
        match timeout(duration, self.lines.next_line()).await {
            Err(_elapsed) => Ok(()),
            Ok(line) => Err(eyre!("Expected silence, got {line:?}")),
        }
    }

    /// Say something to the machine.
    pub async fn reply(&mut self, text: &str) -> Result<()> {
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.flush().await?;

        Ok(())
    }

    /// Hang up.
    pub async fn hang_up(mut self) -> Result<()> {
        self.writer.shutdown().await?;

        Ok(())
    }
}

pub struct Session {
    pub machine: Machine,
    pub handle: JoinHandle<Result<(), Error>>,
    pub controller: Controller,
}

pub fn connect(options: EngineOptions) -> Session {
    let (ours, theirs) = tokio::io::duplex(1024);
    let (machine, handle) = Machine::new(ours, options);

    let (reader, writer) = tokio::io::split(theirs);

    Session {
        machine,
        handle,
        controller: Controller {
            lines: BufReader::new(reader).lines(),
            writer,
        },
    }
}

pub fn connect_json() -> Session {
    connect(EngineOptions::with_protocol(Protocol::Json))
}

pub fn connect_passthrough() -> Session {
    connect(EngineOptions::with_protocol(Protocol::Passthrough))
}

pub async fn receive(subscription: &mut Subscription) -> Result<Message> {
    timeout(PATIENCE, subscription.recv())
        .await?
        .ok_or_else(|| eyre!("Subscription ended"))
}

pub async fn receive_raw(subscription: &mut Subscription) -> Result<String> {
    match receive(subscription).await? {
        Message::Raw(raw) => Ok(raw),
        other => Err(eyre!("Expected a raw message, got {other:?}")),
    }
}

pub async fn session_result(handle: JoinHandle<Result<(), Error>>) -> Result<Result<(), Error>> {
    Ok(timeout(PATIENCE, handle).await??)
}
