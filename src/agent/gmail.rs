use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

use super::{Agent, status_report};
use crate::config::GmailConfig;
use crate::console::formatter::{numbered, truncate};
use crate::console::{Interactive, split_command};
use crate::error::Result;
use crate::provider::OllamaProvider;
use crate::services::gmail::{Email, GmailClient, MessageQuery};
use crate::services::google_auth::GoogleAuth;

const RECENT_LIMIT: u32 = 10;
const SEARCH_LIMIT: u32 = 20;
const SNIPPET_PREVIEW: usize = 100;

#[derive(Serialize)]
struct SummaryItem<'a> {
    subject: &'a str,
    sender: &'a str,
    snippet: &'a str,
}

#[derive(Serialize)]
struct ActionItem<'a> {
    subject: &'a str,
    sender: &'a str,
    body: &'a str,
}

fn summary_prompt(emails: &[Email]) -> String {
    let items: Vec<SummaryItem<'_>> = emails
        .iter()
        .map(|e| SummaryItem {
            subject: &e.subject,
            sender: &e.sender,
            snippet: &e.snippet,
        })
        .collect();
    let listing = serde_json::to_string_pretty(&items).unwrap_or_default();
    format!(
        "Please provide a concise summary of these {} emails:\n\n\
         {listing}\n\n\
         Focus on:\n\
         1. Key themes and topics\n\
         2. Important senders\n\
         3. Any action items or urgent matters\n\
         4. Overall tone and priority\n\n\
         Keep the summary brief and organized.",
        emails.len()
    )
}

fn action_items_prompt(emails: &[Email]) -> String {
    let items: Vec<ActionItem<'_>> = emails
        .iter()
        .map(|e| ActionItem {
            subject: &e.subject,
            sender: &e.sender,
            body: &e.body,
        })
        .collect();
    let listing = serde_json::to_string_pretty(&items).unwrap_or_default();
    format!(
        "Analyze these emails and extract any action items, tasks, or follow-ups needed:\n\n\
         {listing}\n\n\
         For each action item, provide:\n\
         1. The task description\n\
         2. Who it's from\n\
         3. Any deadlines mentioned\n\
         4. Priority level (high/medium/low)\n\n\
         If no action items are found, say so clearly."
    )
}

fn reply_prompt(email: &Email, context: &str) -> String {
    format!(
        "Draft a professional reply to this email:\n\n\
         Subject: {}\n\
         From: {}\n\
         Content: {}\n\n\
         Additional context: {context}\n\n\
         Please write an appropriate, professional response. Keep it concise and helpful.",
        email.subject, email.sender, email.body
    )
}

pub struct GmailAgent {
    gmail: GmailClient,
    model: OllamaProvider,
}

impl GmailAgent {
    /// Sign in (token file, refresh or consent flow) and build the agent.
    pub async fn connect(config: &GmailConfig) -> Result<Self> {
        let auth = GoogleAuth::new(&config.credentials_file, &config.token_file);
        let user = auth.authorize().await?;
        info!("Gmail authentication successful");
        Ok(Self::from_parts(
            GmailClient::new(auth, user),
            OllamaProvider::new(&config.model.host, &config.model.model),
        ))
    }

    pub fn from_parts(gmail: GmailClient, model: OllamaProvider) -> Self {
        Self { gmail, model }
    }

    async fn fetch(&self, query: &MessageQuery) -> Result<Vec<Email>> {
        let refs = self.gmail.list_messages(query).await?;
        let mut emails = Vec::with_capacity(refs.len());
        for msg in refs {
            emails.push(Email::from(self.gmail.get_message(&msg.id).await?));
        }
        Ok(emails)
    }

    pub async fn get_recent_emails(&self, max_results: u32, query: &str) -> Result<Vec<Email>> {
        let emails = self.fetch(&MessageQuery::recent(max_results, query)).await?;
        self.log_action(
            "get_recent_emails",
            &format!("Retrieved {} emails", emails.len()),
        );
        Ok(emails)
    }

    pub async fn search_emails(&self, query: &str, max_results: u32) -> Result<Vec<Email>> {
        let emails = self.fetch(&MessageQuery::recent(max_results, query)).await?;
        self.log_action(
            "search_emails",
            &format!("Found {} emails for query: {query}", emails.len()),
        );
        Ok(emails)
    }

    /// Unread messages on the first result page.
    pub async fn get_unread_count(&self) -> Result<usize> {
        let count = self.gmail.list_messages(&MessageQuery::label("UNREAD")).await?.len();
        self.log_action("get_unread_count", &format!("Found {count} unread emails"));
        Ok(count)
    }

    pub async fn summarize_emails(&self, emails: &[Email]) -> Result<String> {
        if emails.is_empty() {
            return Ok("No emails to summarize".into());
        }
        let summary = self.ask_ai(&summary_prompt(emails)).await?;
        self.log_action(
            "summarize_emails",
            &format!("Summarized {} emails", emails.len()),
        );
        Ok(summary)
    }

    pub async fn extract_action_items(&self, emails: &[Email]) -> Result<String> {
        if emails.is_empty() {
            return Ok("No emails to analyze".into());
        }
        let items = self.ask_ai(&action_items_prompt(emails)).await?;
        self.log_action(
            "extract_action_items",
            &format!("Analyzed {} emails for tasks", emails.len()),
        );
        Ok(items)
    }

    pub async fn draft_reply(&self, email_id: &str, context: &str) -> Result<String> {
        let email = Email::from(self.gmail.get_message(email_id).await?);
        let reply = self.ask_ai(&reply_prompt(&email, context)).await?;
        self.log_action(
            "draft_reply",
            &format!("Drafted reply for email: {}", email.subject),
        );
        Ok(reply)
    }
}

impl Agent for GmailAgent {
    fn name(&self) -> &'static str {
        "gmail"
    }

    fn model(&self) -> &OllamaProvider {
        &self.model
    }

    async fn check_service(&self) -> Result<()> {
        let profile = self.gmail.get_profile().await?;
        info!("Connected to Gmail account: {}", profile.email_address);
        Ok(())
    }

    async fn status(&self) -> Value {
        match self.gmail.get_profile().await {
            Ok(profile) => json!({
                "email": profile.email_address,
                "total_messages": profile.messages_total,
                "threads_total": profile.threads_total,
                "status": "connected",
            }),
            Err(e) => json!({"status": "error", "error": e.to_string()}),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GmailCommand {
    Recent,
    Unread,
    Search(String),
    Summarize,
    Actions,
    Reply(String),
    Status,
}

fn email_lines(emails: &[Email], with_snippet: bool) -> String {
    numbered(emails.iter().map(|e| {
        let mut item = format!("From: {}\nSubject: {}", e.sender, e.subject);
        if with_snippet {
            item.push_str(&format!("\nSnippet: {}", truncate(&e.snippet, SNIPPET_PREVIEW)));
        }
        item.push_str(&format!("\nID: {}", e.id));
        item
    }))
}

impl Interactive for GmailAgent {
    type Command = GmailCommand;

    fn banner(&self) -> &'static str {
        "📧 Gmail Agent - Interactive Mode"
    }

    fn usage(&self) -> &'static str {
        "'recent', 'unread', 'search <query>', 'summarize', 'actions', 'reply <email_id>', 'status', 'quit'"
    }

    fn parse_command(line: &str) -> Option<GmailCommand> {
        match split_command(line) {
            ("recent", None) => Some(GmailCommand::Recent),
            ("unread", None) => Some(GmailCommand::Unread),
            ("search", Some(query)) => Some(GmailCommand::Search(query.to_string())),
            ("summarize", None) => Some(GmailCommand::Summarize),
            ("actions", None) => Some(GmailCommand::Actions),
            ("reply", Some(id)) => Some(GmailCommand::Reply(id.to_string())),
            ("status", None) => Some(GmailCommand::Status),
            _ => None,
        }
    }

    fn progress(command: &GmailCommand) -> Option<&'static str> {
        match command {
            GmailCommand::Summarize => Some("🧠 Generating summary..."),
            GmailCommand::Actions => Some("🧠 Extracting action items..."),
            GmailCommand::Reply(_) => Some("🧠 Drafting reply..."),
            _ => None,
        }
    }

    async fn execute(&mut self, command: GmailCommand) -> Result<String> {
        match command {
            GmailCommand::Recent => {
                let emails = self.get_recent_emails(RECENT_LIMIT, "").await?;
                if emails.is_empty() {
                    return Ok("No emails found".into());
                }
                Ok(format!(
                    "📬 Recent emails ({}):\n{}",
                    emails.len(),
                    email_lines(&emails, true)
                ))
            }
            GmailCommand::Unread => {
                let count = self.get_unread_count().await?;
                Ok(format!("📬 You have {count} unread emails"))
            }
            GmailCommand::Search(query) => {
                let emails = self.search_emails(&query, SEARCH_LIMIT).await?;
                if emails.is_empty() {
                    return Ok(format!("No emails found for '{query}'"));
                }
                Ok(format!(
                    "🔍 Search results for '{query}' ({} found):\n{}",
                    emails.len(),
                    email_lines(&emails, false)
                ))
            }
            GmailCommand::Summarize => {
                let emails = self.get_recent_emails(RECENT_LIMIT, "").await?;
                let summary = self.summarize_emails(&emails).await?;
                if emails.is_empty() {
                    return Ok(summary);
                }
                Ok(format!("📝 Email Summary:\n{summary}"))
            }
            GmailCommand::Actions => {
                let emails = self.get_recent_emails(RECENT_LIMIT, "").await?;
                let actions = self.extract_action_items(&emails).await?;
                if emails.is_empty() {
                    return Ok(actions);
                }
                Ok(format!("✅ Action Items:\n{actions}"))
            }
            GmailCommand::Reply(id) => {
                let reply = self.draft_reply(&id, "").await?;
                Ok(format!("✉️ Draft Reply:\n{reply}"))
            }
            GmailCommand::Status => Ok(status_report(&*self).await),
        }
    }
}
