use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use sse::{QueuePolicy, StreamerOptions};
use std::time::Duration;

const DEFAULT_EVENTS_PATH: &str = "/events";

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "127.0.0.1")]
    pub interface: Option<String>,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = 4000)]
    pub port: u16,

    /// The URL path clients open to receive the event stream
    #[arg(long, env, default_value = DEFAULT_EVENTS_PATH)]
    events_path: String,

    /// Maximum number of undelivered events held per client. A client that
    /// falls this far behind is disconnected. Unbounded when not set.
    #[arg(long, env)]
    pub client_queue_capacity: Option<usize>,

    /// Seconds between keep-alive comments on idle connections. Disabled when not set.
    #[arg(long, env, value_parser = clap::value_parser!(u64).range(1..))]
    pub keep_alive_secs: Option<u64>,

    /// Number of requests that may wait for the broadcast coordinator before producers block
    #[arg(long, env, default_value_t = sse::coordinator::DEFAULT_REQUEST_BUFFER)]
    pub coordinator_buffer: usize,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn interface(&self) -> &str {
        self.interface.as_deref().unwrap_or("127.0.0.1")
    }

    /// Address the server binds to, e.g. `127.0.0.1:4000`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.interface(), self.port)
    }

    pub fn events_path(&self) -> &str {
        &self.events_path
    }

    pub fn queue_policy(&self) -> QueuePolicy {
        match self.client_queue_capacity {
            Some(capacity) => QueuePolicy::Bounded { capacity },
            None => QueuePolicy::Unbounded,
        }
    }

    pub fn streamer_options(&self) -> StreamerOptions {
        StreamerOptions {
            queue_policy: self.queue_policy(),
            keep_alive: self.keep_alive_secs.map(Duration::from_secs),
            request_buffer: self.coordinator_buffer,
        }
    }
}
