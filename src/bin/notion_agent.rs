use std::process::ExitCode;

use local_ai_agents::agent::NotionAgent;
use local_ai_agents::config::{self, NotionConfig};
use local_ai_agents::{console, logging};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    config::load_dotenv();
    logging::init();

    println!("🚀 Starting Notion AI Agent...");

    let config = match NotionConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            println!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("Notion agent v{} using model {}", env!("CARGO_PKG_VERSION"), config.model.model);

    let mut agent = NotionAgent::new(&config);
    console::start(&mut agent, "Notion").await
}
