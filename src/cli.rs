use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::{
    config::{Config, Protocol, Web},
    error::Error,
};

/// The command line interface for cnc keel.
///
/// Flags take precedence over the configuration file.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to a configuration file
    pub config: Option<PathBuf>,

    /// The serial device the controller is attached to
    #[arg(long)]
    pub dev: Option<String>,

    /// Baud rate of the serial device
    #[arg(long)]
    pub rate: Option<u32>,

    /// Whether the controller speaks json. Without it, lines are passed through as is
    #[arg(long, value_name = "BOOL")]
    pub json: Option<bool>,

    /// Start the websocket front end
    #[arg(long)]
    pub web: bool,

    /// Port of the websocket front end. Implies `--web`
    #[arg(long)]
    pub port: Option<u16>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Commands available in the command line interface.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Examples for user convenience.
    #[clap(subcommand)]
    Examples(Examples),
}

/// Helpful examples for users.
#[derive(Subcommand, Debug, Clone)]
pub enum Examples {
    /// Show an example of a configuration file's contents.
    Config,

    /// Show an example json request a websocket client may send.
    Request,

    /// Show an example json message a websocket client receives.
    Message,
}

/// Print what the given command asks for.
pub fn handle_command(command: Commands) {
    match command {
        Commands::Examples(example) => match example {
            Examples::Config => {
                println!("{}", Config::example().serialize_pretty());
            }
            Examples::Request => {
                println!("{}", crate::websocket::WebRequest::raw("G0 X10").serialize());
            }
            Examples::Message => {
                let state = crate::message::MachineState {
                    x: Some(10.0),
                    y: Some(0.0),
                    z: None,
                };
                let message = crate::message::Message::State(state);
                println!("{}", message.envelope().serialize());
            }
        },
    }
}

impl Cli {
    /// The configuration to run with: from file if one was given, else the default,
    /// then overridden by any flags.
    pub fn to_config(&self) -> Result<Config, Error> {
        let mut config = match &self.config {
            Some(path) => Config::new_from_path(path)?,
            None => Config::default(),
        };

        if let Some(dev) = &self.dev {
            config.device = dev.clone();
        }

        if let Some(rate) = self.rate {
            config.baud = rate;
        }

        if let Some(json) = self.json {
            config.protocol = Protocol::from_json_flag(json);
        }

        match (self.web, self.port) {
            (_, Some(port)) => config.web = Some(Web { port }),
            (true, None) => {
                config.web.get_or_insert_with(Web::default);
            }
            (false, None) => {}
        }

        Ok(config)
    }
}
