//! agora-cli: terminal client for the Agora assistant chat API
//!
//! # Subcommands
//! - `chat <message> [--history <file>] [--json]`: send one message
//! - `repl`                                       : interactive chat that keeps the history locally
//! - `version`                                    : show server version

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

const DEFAULT_SERVER: &str = "http://127.0.0.1:8787";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "agora-cli", version, about = "Talk to the Agora assistant from a terminal")]
struct Cli {
    /// Agora HTTP server URL (overrides AGORA_HTTP_URL env var)
    #[arg(long, env = "AGORA_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    /// Session token, sent as a bearer credential
    #[arg(long, env = "AGORA_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Send a single message
    Chat {
        /// Message text
        message: String,

        /// JSON file with prior turns: [{"role": "user"|"model", "parts": "..."}]
        #[arg(long)]
        history: Option<String>,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Interactive session; history is kept in memory and sent each turn
    Repl,

    /// Show the server version
    Version,
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: String,
    pub parts: String,
}

#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub message: &'a str,
    pub history: &'a [Turn],
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ChatReply {
    pub text: String,
    pub success: bool,
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    pub error: String,
}

/// Record a completed exchange in the local history.
///
/// Fallback answers are not recorded: they are not something the model said.
pub fn record_exchange(history: &mut Vec<Turn>, message: &str, reply: &ChatReply) {
    if !reply.success {
        return;
    }
    history.push(Turn {
        role: "user".to_string(),
        parts: message.to_string(),
    });
    history.push(Turn {
        role: "model".to_string(),
        parts: reply.text.clone(),
    });
}

pub fn load_history(path: &Path) -> anyhow::Result<Vec<Turn>> {
    let raw = std::fs::read_to_string(path)?;
    let turns: Vec<Turn> = serde_json::from_str(&raw)?;
    Ok(turns)
}

/// Render a non-2xx body, preferring the server's `error` field.
pub fn describe_error(status: u16, body: &str) -> String {
    match serde_json::from_str::<ApiError>(body) {
        Ok(e) => format!("server returned {}: {}", status, e.error),
        Err(_) => format!("server returned {}: {}", status, body),
    }
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

struct Client {
    http: reqwest::blocking::Client,
    server: String,
    token: Option<String>,
}

impl Client {
    fn new(server: &str, token: Option<String>) -> anyhow::Result<Self> {
        // no timeout: the model call on the server side has none either
        let http = reqwest::blocking::Client::builder().timeout(None::<Duration>).build()?;
        Ok(Self {
            http,
            server: server.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn send(&self, message: &str, history: &[Turn]) -> anyhow::Result<ChatReply> {
        let url = format!("{}/api/chat", self.server);
        let mut req = self.http.post(&url).json(&ChatRequest { message, history });
        if let Some(t) = &self.token {
            req = req.bearer_auth(t);
        }

        let resp = req
            .send()
            .map_err(|e| anyhow::anyhow!("connection failed to {}: {}", url, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            anyhow::bail!(describe_error(status.as_u16(), &body));
        }

        Ok(resp.json()?)
    }
}

fn do_chat(client: &Client, message: &str, history: Option<&str>, json_output: bool) -> anyhow::Result<()> {
    let turns = match history {
        Some(p) => load_history(Path::new(p))?,
        None => Vec::new(),
    };

    let reply = client.send(message, &turns)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&reply)?);
    } else {
        println!("{}", reply.text);
        if !reply.success {
            eprintln!("agora-cli: the assistant could not reach the model (fallback reply)");
        }
    }
    Ok(())
}

fn do_repl(client: &Client) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut history: Vec<Turn> = Vec::new();

    println!("Agora assistant. Empty line or Ctrl+D to quit.");
    loop {
        print!("you> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let message = line.trim();
        if message.is_empty() {
            break;
        }

        match client.send(message, &history) {
            Ok(reply) => {
                println!("assistant> {}\n", reply.text);
                record_exchange(&mut history, message, &reply);
            }
            Err(e) => eprintln!("agora-cli: {}", e),
        }
    }
    Ok(())
}

fn do_version(server: &str) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let url = format!("{}/version", server.trim_end_matches('/'));
    let body: serde_json::Value = client.get(&url).send()?.error_for_status()?.json()?;
    println!("Agora server: {}", body["version"].as_str().unwrap_or("?"));
    println!("Protocol:     {}", body["protocol"].as_str().unwrap_or("?"));
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Version => do_version(&cli.server),
        Commands::Chat {
            message,
            history,
            json,
        } => Client::new(&cli.server, cli.token)
            .and_then(|client| do_chat(&client, &message, history.as_deref(), json)),
        Commands::Repl => Client::new(&cli.server, cli.token).and_then(|client| do_repl(&client)),
    };

    if let Err(e) = result {
        eprintln!("agora-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(text: &str, success: bool) -> ChatReply {
        ChatReply {
            text: text.to_string(),
            success,
        }
    }

    #[test]
    fn test_request_wire_shape() {
        let history = vec![Turn {
            role: "user".into(),
            parts: "Hi".into(),
        }];
        let v = serde_json::to_value(ChatRequest {
            message: "Next",
            history: &history,
        })
        .unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "message": "Next",
                "history": [{ "role": "user", "parts": "Hi" }]
            })
        );
    }

    #[test]
    fn test_record_exchange_appends_user_then_model() {
        let mut history = Vec::new();
        record_exchange(&mut history, "Hello", &reply("Hi there", true));
        record_exchange(&mut history, "Bye", &reply("Goodbye", true));

        let roles: Vec<&str> = history.iter().map(|t| t.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "model", "user", "model"]);
        assert_eq!(history[1].parts, "Hi there");
    }

    #[test]
    fn test_record_exchange_skips_fallback() {
        let mut history = Vec::new();
        record_exchange(&mut history, "Hello", &reply("Sorry...", false));
        assert!(history.is_empty());
    }

    #[test]
    fn test_describe_error_prefers_error_field() {
        assert_eq!(
            describe_error(400, r#"{"error":"Message is required"}"#),
            "server returned 400: Message is required"
        );
        assert_eq!(describe_error(502, "Bad Gateway"), "server returned 502: Bad Gateway");
    }

    #[test]
    fn test_load_history_from_file() {
        let path = std::env::temp_dir().join(format!("agora-cli-history-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"[{"role":"user","parts":"a"},{"role":"model","parts":"b"}]"#,
        )
        .unwrap();

        let turns = load_history(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].role, "model");
    }

    #[test]
    fn test_load_history_rejects_bad_json() {
        let path = std::env::temp_dir().join(format!("agora-cli-bad-{}.json", std::process::id()));
        std::fs::write(&path, "{ not a list").unwrap();
        let result = load_history(&path);
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }
}
