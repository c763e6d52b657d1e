#![deny(missing_docs)]

//! Talk to a TinyG-style CNC controller over a serial port.
//!
//! A [`machine::Machine`] owns the connection.
//! Commands sent to it are written one at a time, each held until the controller
//! acknowledges the previous one. Whatever the controller says, acknowledgements
//! and unsolicited status reports alike, is framed, projected onto the known
//! position of the machine and broadcast to every subscriber.
//!
//! Subscribers which fall behind miss messages instead of slowing the machine down.

/// Possible errors in this library.
pub mod error;

/// Serial port driver and the codecs which frame what goes over it.
pub mod serial;

/// Replies of a TinyG controller.
pub mod tinyg;

/// What a machine tells its subscribers.
pub mod message;

/// Fan-out of messages to any number of subscribers.
pub mod pubsub;

/// The command/response cycle against a connected machine.
pub mod machine;

/// Relates to config files.
pub mod config;

/// Operator g-code handling.
pub mod gcode;

/// Printing machine messages for an operator.
pub mod terminal;

/// Code relating to setting up the server which lets websocket clients talk to a machine.
pub mod server;

/// Handles incoming websockets.
pub mod websocket;

/// A websocket client.
pub mod client;

/// The command line interface.
pub mod cli;

/// Logging/tracing setup.
pub mod logging;
