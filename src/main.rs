use std::io::Write;

use cloudapp_sdk::config::{load_config, ClientConfig};
use cloudapp_sdk::observability::init_tracing;
use cloudapp_sdk::stream::{AgentStreamEvent, ChatStreamEvent};
use cloudapp_sdk::{AgentChatRequest, ChatMessage, ChatRequest, PlatformClient, SdkError};
use futures_util::StreamExt;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const USAGE: &str = "usage:\n  cloudapp chat <prompt>\n  cloudapp agent <agent-id> <prompt>";

enum Command {
    Chat { prompt: String },
    Agent { agent_id: String, prompt: String },
}

fn parse_command(args: &[String]) -> Option<Command> {
    match args {
        [cmd, rest @ ..] if cmd == "chat" && !rest.is_empty() => Some(Command::Chat {
            prompt: rest.join(" "),
        }),
        [cmd, agent_id, rest @ ..] if cmd == "agent" && !rest.is_empty() => Some(Command::Agent {
            agent_id: agent_id.clone(),
            prompt: rest.join(" "),
        }),
        _ => None,
    }
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = parse_command(&args) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    let config_path =
        std::env::var("CLOUDAPP_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = load_config(&config_path).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        eprintln!("Please copy 'config.example.yaml' to 'config.yaml' and modify as needed.");
        std::process::exit(1);
    });

    init_tracing(&config.features.log_level);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Failed to initialize Tokio runtime: {e}");
            std::process::exit(1);
        });

    if let Err(err) = runtime.block_on(run(&config, command)) {
        eprintln!("\nerror: {err}");
        std::process::exit(1);
    }
}

async fn run(config: &ClientConfig, command: Command) -> Result<(), SdkError> {
    let client = PlatformClient::from_config(config)?;
    let mut stdout = std::io::stdout();

    match command {
        Command::Chat { prompt } => {
            let request = ChatRequest::new(vec![ChatMessage::user(prompt)]);
            let mut events = client.stream_chat(&request).await?;
            while let Some(event) = events.next().await {
                match event? {
                    ChatStreamEvent::Delta { content, .. } => {
                        print!("{content}");
                        let _ = stdout.flush();
                    }
                    ChatStreamEvent::Finish { reason } => {
                        tracing::debug!(finish_reason = ?reason, "chat finished");
                    }
                }
            }
        }
        Command::Agent { agent_id, prompt } => {
            let request = AgentChatRequest::new(prompt);
            let mut events = client.stream_agent_chat(&agent_id, &request).await?;
            while let Some(event) = events.next().await {
                match event? {
                    AgentStreamEvent::Chunk { chunk, .. } => {
                        print!("{chunk}");
                        let _ = stdout.flush();
                    }
                    AgentStreamEvent::Thinking { message } => {
                        tracing::info!(status = %message, "agent thinking");
                    }
                    AgentStreamEvent::Message(message) => {
                        tracing::debug!(message_id = ?message.id, "agent message complete");
                    }
                    AgentStreamEvent::Error { message } => {
                        return Err(SdkError::Application(message));
                    }
                    AgentStreamEvent::Done => {}
                }
            }
        }
    }
    println!();
    Ok(())
}
