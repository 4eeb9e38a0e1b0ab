use std::process::ExitCode;

use local_ai_agents::agent::SpotifyAgent;
use local_ai_agents::config::{self, SpotifyConfig};
use local_ai_agents::{console, logging};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    config::load_dotenv();
    logging::init();

    println!("🚀 Starting Spotify AI Agent...");

    let config = match SpotifyConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            println!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        "Spotify agent v{} ({:?} auth) using model {}",
        env!("CARGO_PKG_VERSION"),
        config.flow,
        config.model.model
    );

    let mut agent = match SpotifyAgent::connect(&config).await {
        Ok(agent) => agent,
        Err(e) => {
            println!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    console::start(&mut agent, "Spotify").await
}
