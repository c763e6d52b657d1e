//! A command/message interface to a connected CNC machine.
//!
//! One running [`Machine`] accepts commands from anywhere and
//! sends what the controller says back to any number of listeners.

use std::time::Duration;

use futures::{SinkExt, Stream, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
    time::{timeout_at, Instant},
};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, info_span, trace, warn, Instrument};

use crate::{
    config::Protocol,
    error::Error,
    message::{MachineState, Message},
    pubsub::{self, Publisher, Subscribers, Subscription, DEFAULT_SUBSCRIBER_CAPACITY},
    serial::{
        codecs::{json::JsonObjectCodec, lines::LinesCodec},
        error::SerialPortError,
    },
    tinyg::Response,
};

/// Parsed responses waiting for the synchronizer.
/// When full, reading from the link pauses.
const RESPONSE_QUEUE: usize = 32;

/// Commands accepted but not yet written to the link.
pub const COMMAND_QUEUE: usize = 32;

/// How a machine session behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// See [`Protocol`].
    pub protocol: Protocol,

    /// How far each subscriber may lag behind before missing messages.
    pub subscriber_capacity: usize,

    /// How long a command may go unacknowledged before the session is given up.
    /// `None` waits forever.
    pub ack_timeout: Option<Duration>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            protocol: Protocol::Json,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            ack_timeout: None,
        }
    }
}

impl EngineOptions {
    /// Default options for the given protocol.
    pub fn with_protocol(protocol: Protocol) -> Self {
        Self {
            protocol,
            ..Default::default()
        }
    }
}

/// A connected CNC machine.
///
/// Cheap to clone, all clones drive the same session.
/// The session stops when the connection fails or closes,
/// or when every clone has been dropped.
#[derive(Debug, Clone)]
pub struct Machine {
    commands: mpsc::Sender<String>,
    subscribers: Subscribers,
}

impl Machine {
    /// Start a session over the given connection, usually an opened serial port.
    ///
    /// The returned handle resolves when the session is over,
    /// with the reason it ended if that was not all [`Machine`]s being dropped.
    pub fn new<C>(connection: C, options: EngineOptions) -> (Self, JoinHandle<Result<(), Error>>)
    where
        C: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(connection);

        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE);
        let (responses_tx, responses_rx) = mpsc::channel(RESPONSE_QUEUE);
        let (publisher, subscribers) = pubsub::pubsub(options.subscriber_capacity);

        let reader = tokio::spawn(
            read_responses(reader, options.protocol, responses_tx).instrument(info_span!("Reader")),
        );

        let synchronizer = Synchronizer {
            protocol: options.protocol,
            link: FramedWrite::new(writer, LinesCodec::default()),
            commands: commands_rx,
            responses: responses_rx,
            publisher,
            state: MachineState::unknown(),
            ack_timeout: options.ack_timeout,
            reader,
        };

        let span = info_span!("Synchronizer", protocol = ?options.protocol);
        let handle = tokio::spawn(synchronizer.run().instrument(span));

        (
            Self {
                commands: commands_tx,
                subscribers,
            },
            handle,
        )
    }

    /// Queue a command for the machine.
    ///
    /// Waits only while [`COMMAND_QUEUE`] commands are already queued,
    /// which happens when the controller is slow to acknowledge.
    /// It does not wait until the command is written, let alone executed.
    /// Blank commands are ignored.
    pub async fn send<S: Into<String>>(&self, command: S) -> Result<(), Error> {
        self.commands
            .send(command.into())
            .await
            .map_err(|_| Error::SessionEnded)
    }

    /// Queue a command for the machine without waiting.
    ///
    /// Fails with [`Error::CommandQueueFull`] instead of waiting for room.
    pub fn try_send<S: Into<String>>(&self, command: S) -> Result<(), Error> {
        self.commands.try_send(command.into()).map_err(|e| match e {
            TrySendError::Full(_) => Error::CommandQueueFull(COMMAND_QUEUE),
            TrySendError::Closed(_) => Error::SessionEnded,
        })
    }

    /// Follow messages from the machine.
    ///
    /// Messages which do not fit in the subscription are discarded,
    /// so it's safe to not read from it.
    pub fn subscribe(&self) -> Subscription {
        self.subscribers.subscribe()
    }
}

/// Where the synchronizer is in a command cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// No command in flight.
    Idle,

    /// A command was written, its acknowledgement has not been seen yet.
    AwaitingAck { deadline: Option<Instant> },
}

struct Synchronizer<W> {
    protocol: Protocol,
    link: FramedWrite<W, LinesCodec>,
    commands: mpsc::Receiver<String>,
    responses: mpsc::Receiver<Result<Response, Error>>,
    publisher: Publisher,
    state: MachineState,
    ack_timeout: Option<Duration>,
    reader: JoinHandle<()>,
}

fn incoming(response: Option<Result<Response, Error>>) -> Result<Response, Error> {
    response.unwrap_or(Err(Error::ConnectionClosed))
}

impl<W> Synchronizer<W>
where
    W: AsyncWrite + Unpin,
{
    async fn run(mut self) -> Result<(), Error> {
        let result = self.run_phases().await;

        match &result {
            Ok(()) => info!("No machine handles left, stopping"),
            Err(e) => warn!(%e, "Machine session ended"),
        }

        self.reader.abort();

        result
    }

    async fn run_phases(&mut self) -> Result<(), Error> {
        let mut phase = Phase::Idle;

        loop {
            phase = match phase {
                Phase::Idle => match self.idle().await? {
                    Some(next) => next,
                    None => return Ok(()),
                },
                Phase::AwaitingAck { deadline } => self.await_ack(deadline).await?,
            };
        }
    }

    /// Whichever comes first: a command to send or something the machine said on its own.
    /// `None` when no more commands can arrive.
    async fn idle(&mut self) -> Result<Option<Phase>, Error> {
        tokio::select! {
            command = self.commands.recv() => match command {
                Some(command) => self.execute(command).await.map(Some),
                None => Ok(None),
            },
            response = self.responses.recv() => {
                self.process(incoming(response)?);
                Ok(Some(Phase::Idle))
            }
        }
    }

    async fn execute(&mut self, command: String) -> Result<Phase, Error> {
        let command = command.trim_end_matches(&['\r', '\n'][..]);
        if command.trim().is_empty() {
            trace!("Ignoring blank command");
            return Ok(Phase::Idle);
        }

        info!(%command, "Sending");
        self.link.send(command.as_bytes().to_vec()).await?;

        match self.protocol {
            Protocol::Json => Ok(Phase::AwaitingAck {
                deadline: self.ack_timeout.map(|limit| Instant::now() + limit),
            }),
            Protocol::Passthrough => Ok(Phase::Idle),
        }
    }

    /// Drain responses until one acknowledges the command in flight.
    /// Commands sent meanwhile stay queued.
    async fn await_ack(&mut self, deadline: Option<Instant>) -> Result<Phase, Error> {
        let response = match (deadline, self.ack_timeout) {
            (Some(deadline), Some(limit)) => timeout_at(deadline, self.responses.recv())
                .await
                .map_err(|_| Error::AckTimeout(limit))?,
            _ => self.responses.recv().await,
        };
        let response = incoming(response)?;

        let acknowledged = response.is_ack();
        self.process(response);

        if acknowledged {
            debug!("Command acknowledged");
            Ok(Phase::Idle)
        } else {
            Ok(Phase::AwaitingAck { deadline })
        }
    }

    fn process(&mut self, response: Response) {
        match self.protocol {
            Protocol::Passthrough => self
                .publisher
                .publish(Message::Raw(response.text().to_owned())),
            Protocol::Json => {
                self.publisher.publish(Message::Raw(response.to_string()));

                if let Some(report) = response.report() {
                    self.state.apply(report);
                }
                trace!(state = %self.state);
                self.publisher.publish(Message::State(self.state));
            }
        }
    }
}

async fn read_responses<R>(
    reader: R,
    protocol: Protocol,
    responses: mpsc::Sender<Result<Response, Error>>,
) where
    R: AsyncRead + Unpin,
{
    match protocol {
        Protocol::Json => {
            let frames = FramedRead::new(reader, JsonObjectCodec::new());
            forward(frames, responses, |frame| Response::parse_bytes(&frame)).await
        }
        Protocol::Passthrough => {
            let lines = FramedRead::new(reader, LinesCodec::default());
            forward(lines, responses, |line| {
                Ok(Response::passthrough(String::from_utf8_lossy(&line)))
            })
            .await
        }
    }
}

/// Project each frame into a [`Response`] and pass it on, stopping at the first error.
async fn forward<S, T, F>(
    mut frames: S,
    responses: mpsc::Sender<Result<Response, Error>>,
    project: F,
) where
    S: Stream<Item = Result<T, SerialPortError>> + Unpin,
    F: Fn(T) -> Result<Response, Error>,
{
    while let Some(frame) = frames.next().await {
        let response = frame.map_err(Error::from).and_then(&project);
        let fatal = response.is_err();

        match &response {
            Ok(response) => trace!(text = response.text(), "Response"),
            Err(e) => warn!(%e, "Cannot read from machine"),
        }

        if responses.send(response).await.is_err() {
            debug!("Synchronizer gone, stop reading");
            return;
        }
        if fatal {
            return;
        }
    }

    info!("Machine connection closed");
}
