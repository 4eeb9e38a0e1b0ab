use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

use super::{Agent, status_report};
use crate::config::NotionConfig;
use crate::console::formatter::numbered;
use crate::console::{Interactive, split_command};
use crate::error::Result;
use crate::provider::OllamaProvider;
use crate::services::notion::{NotionClient, database_title, page_title, record_id};

/// Pages per database included in `ask` context.
const ASK_PAGE_LIMIT: u32 = 5;
const SUMMARY_PAGE_LIMIT: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageInfo {
    pub title: String,
    pub created: String,
    pub last_edited: String,
}

impl PageInfo {
    fn from_page(page: &Value) -> Self {
        Self {
            title: page_title(page),
            created: page["created_time"].as_str().unwrap_or_default().to_string(),
            last_edited: page["last_edited_time"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
        }
    }
}

/// Database overview line used in the `ask` context.
struct DatabaseSummary {
    title: String,
    id: String,
    page_count: usize,
}

fn question_prompt(databases: &[DatabaseSummary], question: &str) -> String {
    let mut context = format!(
        "You are an AI assistant that has access to a user's Notion workspace.\n\n\
         Current Notion workspace contains:\n\
         - {} databases\n\n\
         Database details:\n",
        databases.len()
    );
    for db in databases {
        context.push_str(&format!(
            "\n- Database: '{}' (ID: {}) with {} pages",
            db.title, db.id, db.page_count
        ));
    }
    context.push_str(&format!("\n\nUser question: {question}"));
    context.push_str(
        "\n\nPlease answer based on the Notion data provided above. If you need more specific \
         information about a database, suggest using the 'summarize' command.",
    );
    context
}

fn summary_prompt(pages: &[PageInfo]) -> String {
    let listing = serde_json::to_string_pretty(pages).unwrap_or_default();
    format!(
        "I have a Notion database with {} pages. Here's the information:\n\n\
         {listing}\n\n\
         Please provide a brief summary of this database content and suggest what type of \
         database this might be.",
        pages.len()
    )
}

pub struct NotionAgent {
    notion: NotionClient,
    model: OllamaProvider,
}

impl NotionAgent {
    pub fn new(config: &NotionConfig) -> Self {
        Self::from_parts(
            NotionClient::new(&config.token),
            OllamaProvider::new(&config.model.host, &config.model.model),
        )
    }

    pub fn from_parts(notion: NotionClient, model: OllamaProvider) -> Self {
        Self { notion, model }
    }

    pub async fn get_databases(&self) -> Result<Vec<Value>> {
        Ok(self.notion.search_databases().await?)
    }

    pub async fn get_database_pages(&self, database_id: &str, limit: u32) -> Result<Vec<Value>> {
        Ok(self.notion.query_database(database_id, limit).await?)
    }

    pub async fn ask_about_notion(&self, question: &str) -> Result<String> {
        let databases = self.get_databases().await?;

        let mut summaries = Vec::with_capacity(databases.len());
        for db in &databases {
            let id = record_id(db);
            let pages = self.get_database_pages(id, ASK_PAGE_LIMIT).await?;
            summaries.push(DatabaseSummary {
                title: database_title(db),
                id: id.to_string(),
                page_count: pages.len(),
            });
        }

        self.log_action("ask_about_notion", &format!("Answering question: {question}"));
        self.ask_ai(&question_prompt(&summaries, question)).await
    }

    pub async fn summarize_database(&self, database_id: &str) -> Result<String> {
        let pages = self.get_database_pages(database_id, SUMMARY_PAGE_LIMIT).await?;
        if pages.is_empty() {
            return Ok("No pages found in database".into());
        }

        let page_info: Vec<PageInfo> = pages.iter().map(PageInfo::from_page).collect();
        self.log_action(
            "summarize_database",
            &format!("Summarizing database ID: {database_id}"),
        );
        self.ask_ai(&summary_prompt(&page_info)).await
    }
}

impl Agent for NotionAgent {
    fn name(&self) -> &'static str {
        "notion"
    }

    fn model(&self) -> &OllamaProvider {
        &self.model
    }

    async fn check_service(&self) -> Result<()> {
        let databases = self.get_databases().await?;
        info!("Connected to Notion! Found {} databases", databases.len());
        Ok(())
    }

    async fn status(&self) -> Value {
        match self.get_databases().await {
            Ok(databases) => json!({"status": "connected", "database_count": databases.len()}),
            Err(e) => json!({"status": "error", "error": e.to_string()}),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotionCommand {
    Databases,
    Summarize(String),
    Ask(String),
    Status,
}

impl Interactive for NotionAgent {
    type Command = NotionCommand;

    fn banner(&self) -> &'static str {
        "🤖 Notion AI Agent - Interactive Mode"
    }

    fn usage(&self) -> &'static str {
        "'databases', 'summarize <db_id>', 'ask <question>', 'status', 'quit'"
    }

    fn parse_command(line: &str) -> Option<NotionCommand> {
        match split_command(line) {
            ("databases", None) => Some(NotionCommand::Databases),
            ("summarize", Some(id)) => Some(NotionCommand::Summarize(id.to_string())),
            ("ask", Some(question)) => Some(NotionCommand::Ask(question.to_string())),
            ("status", None) => Some(NotionCommand::Status),
            _ => None,
        }
    }

    fn progress(command: &NotionCommand) -> Option<&'static str> {
        match command {
            NotionCommand::Summarize(_) => Some("🧠 Analyzing database..."),
            NotionCommand::Ask(_) => Some("🤔 Thinking..."),
            _ => None,
        }
    }

    async fn execute(&mut self, command: NotionCommand) -> Result<String> {
        match command {
            NotionCommand::Databases => {
                let databases = self.get_databases().await?;
                if databases.is_empty() {
                    return Ok("No databases found".into());
                }
                let lines = databases
                    .iter()
                    .map(|db| format!("{} (ID: {})", database_title(db), record_id(db)));
                Ok(format!("📊 Available databases:\n{}", numbered(lines)))
            }
            NotionCommand::Summarize(id) => {
                let summary = self.summarize_database(&id).await?;
                Ok(format!("📝 Summary:\n{summary}"))
            }
            NotionCommand::Ask(question) => {
                let answer = self.ask_about_notion(&question).await?;
                Ok(format!("💡 Answer:\n{answer}"))
            }
            NotionCommand::Status => Ok(status_report(&*self).await),
        }
    }
}
