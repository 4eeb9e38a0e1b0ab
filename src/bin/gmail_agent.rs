use std::process::ExitCode;

use local_ai_agents::agent::GmailAgent;
use local_ai_agents::config::{self, GmailConfig};
use local_ai_agents::{console, logging};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    config::load_dotenv();
    logging::init();

    println!("🚀 Starting Gmail AI Agent...");

    let config = GmailConfig::from_env();
    tracing::info!("Gmail agent v{} using model {}", env!("CARGO_PKG_VERSION"), config.model.model);

    // Authorization may open a consent flow; it finishes before the prompt starts.
    let mut agent = match GmailAgent::connect(&config).await {
        Ok(agent) => agent,
        Err(e) => {
            println!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    console::start(&mut agent, "Gmail").await
}
