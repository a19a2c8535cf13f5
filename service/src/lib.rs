use config::Config;
use sse::Streamer;

pub mod config;
pub mod logging;

// Service-level state shared by every route.
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub streamer: Streamer,
    pub config: Config,
}

impl AppState {
    /// Builds the state, starting the event streamer configured by `app_config`.
    /// Must be called from within a tokio runtime.
    pub fn new(app_config: Config) -> Self {
        let streamer = Streamer::with_options(app_config.streamer_options());
        Self {
            streamer,
            config: app_config,
        }
    }
}
