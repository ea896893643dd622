use anyhow::{Context, Result, bail};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::app::{App, SendOutcome};
use crate::config::{API_KEY_ENV, Config};
use crate::error::ChatError;
use crate::events::{Conversation, LlmEvent, Message, Role};
use crate::image;
use crate::llm::{LlmClient, LlmRequest};
use crate::slash::{ParsedCommand, SlashCommand, get_help_text, parse_slash_command};
use crate::storage::ConversationStore;

/// What the chat loop should do after a slash command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConversationAction {
    None,
    Exit,
}

/// Prints only the part of the cumulative text not shown yet
struct ProgressPrinter<W: Write> {
    out: W,
    printed: usize,
}

impl ProgressPrinter<io::Stdout> {
    fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ProgressPrinter<W> {
    fn new(out: W) -> Self {
        Self { out, printed: 0 }
    }

    fn update(&mut self, text: &str) {
        if self.printed == 0 {
            let _ = write!(self.out, "🤖 {}: ", Role::Model.display_name());
        }
        if let Some(fresh) = text.get(self.printed..) {
            let _ = write!(self.out, "{}", fresh);
            let _ = self.out.flush();
        }
        self.printed = text.len();
    }

    fn has_output(&self) -> bool {
        self.printed > 0
    }
}

fn print_conversation_list(store: &ConversationStore, current: Option<&str>) {
    if store.list().is_empty() {
        println!("📭 No conversations yet. Run 'nova' to start chatting!");
        return;
    }

    println!("💬 Your conversations:");
    println!("{}", "=".repeat(50));
    for (index, chat) in store.list().iter().enumerate() {
        let marker = if Some(chat.id.as_str()) == current { "▶" } else { " " };
        println!(
            "{} {:>2}. {}  ({}, {} messages)",
            marker,
            index + 1,
            chat.title,
            chat.formatted_date(),
            chat.messages.len()
        );
    }
}

fn print_transcript(chat: &Conversation) {
    println!("📋 {}  [{}]", chat.title, chat.formatted_date());
    println!("{}", "=".repeat(50));
    if chat.is_empty() {
        println!("(no messages yet)");
    }
    for message in &chat.messages {
        let icon = match message.role {
            Role::User => "👤",
            Role::Model => "🤖",
        };
        let attachment = if message.image.is_some() { " 🖼️ [image]" } else { "" };
        println!("{} {}:{} {}", icon, message.role.display_name(), attachment, message.text);
        println!();
    }
}

/// `nova list`
pub fn list_conversations(config: &Config) -> Result<()> {
    let store = ConversationStore::load(config.chats_path())?;
    print_conversation_list(&store, None);
    Ok(())
}

/// `nova show <id>`
pub fn show_conversation(config: &Config, key: &str) -> Result<()> {
    let store = ConversationStore::load(config.chats_path())?;
    match store.resolve(key) {
        Some(chat) => print_transcript(chat),
        None => {
            println!("❌ Conversation '{}' not found.", key);
            println!("Run 'nova list' to see saved conversations.");
        }
    }
    Ok(())
}

/// `nova ask <prompt>`: one turn in a fresh conversation, streamed to stdout
pub async fn ask(config: &Config, prompt: &str, image_path: Option<&Path>) -> Result<()> {
    if !config.has_api_key() {
        bail!(
            "No API key configured. Set {} or save one with /key in 'nova chat'.",
            API_KEY_ENV
        );
    }

    let mut message = Message::user(prompt.trim());
    if let Some(path) = image_path {
        message = message.with_image(image::load_image(path)?);
    }
    if message.text.is_empty() && message.image.is_none() {
        bail!("Nothing to send");
    }

    let mut store = ConversationStore::load(config.chats_path())?;
    let chat_id = store.new_conversation()?;
    store.append(&chat_id, message)?;

    let history = store
        .get(&chat_id)
        .map(|chat| chat.messages.clone())
        .unwrap_or_default();
    let request = LlmRequest::new(history)
        .with_system_instruction(config.system_instruction.clone())
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_output_tokens);

    let client = LlmClient::new(config)?;
    let mut events = client.stream_response(request);
    let mut printer = ProgressPrinter::stdout();

    while let Some(event) = events.recv().await {
        match event {
            LlmEvent::Progress(text) => printer.update(&text),
            LlmEvent::Complete(text) => {
                println!();
                store.append(&chat_id, Message::model(text))?;
                break;
            }
            LlmEvent::Error(message) => {
                if printer.has_output() {
                    println!();
                }
                bail!(message);
            }
        }
    }

    Ok(())
}

/// `nova chat`: interactive loop over stdin
pub async fn chat(config: Config) -> Result<()> {
    let mut app = App::new(config)?;

    println!("✨ Nova is chatting with {}", app.model());
    println!("Type a message, or /help for commands.");
    println!();
    if let Some(chat) = app.current_conversation() {
        if !chat.is_empty() {
            print_transcript(chat);
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{}› ", if app.pending_image().is_some() { "🖼️ " } else { "" });
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await.context("Failed to read user input")? else {
            break;
        };
        let input = line.trim();

        if input.starts_with('/') {
            match parse_slash_command(input) {
                Some(command) => {
                    if handle_slash_command(&mut app, command)? == ConversationAction::Exit {
                        break;
                    }
                }
                None => println!("❓ Unknown command: {} (try /help)", input),
            }
            continue;
        }

        send(&mut app, input).await;
    }

    println!("👋 Bye!");
    Ok(())
}

async fn send(app: &mut App, input: &str) {
    let mut printer = ProgressPrinter::stdout();
    let result = app.send_message(input, |text| printer.update(text)).await;

    match result {
        Ok(SendOutcome::Ignored) => {}
        Ok(SendOutcome::Reply(_)) => {
            if !printer.has_output() {
                print!("🤖 {}: (empty response)", Role::Model.display_name());
            }
            println!();
            println!();
        }
        Err(ChatError::MissingApiKey) => {
            println!("🔑 Please enter API Key: /key <value> (or set {})", API_KEY_ENV);
        }
        Err(err) => {
            if printer.has_output() {
                println!();
            }
            println!("❌ Error: {}", err);
            if err.is_not_found() {
                println!(
                    "💡 Model '{}' may not be available. Switch with /model <name>.",
                    app.model()
                );
            }
        }
    }
}

fn handle_slash_command(app: &mut App, command: ParsedCommand) -> Result<ConversationAction> {
    match command.command {
        SlashCommand::New => {
            app.start_new_chat()?;
            println!("✨ Started a new conversation");
        }
        SlashCommand::List => {
            let current = app.current_conversation().map(|chat| chat.id.clone());
            print_conversation_list(app.store(), current.as_deref());
        }
        SlashCommand::Open => match command.argument() {
            Some(key) => match app.open_chat(key) {
                Ok(chat) => print_transcript(chat),
                Err(err) => println!("❌ {}", err),
            },
            None => println!("Usage: /open <number|id>"),
        },
        SlashCommand::Model => match command.argument() {
            Some(model) => {
                let model = model.to_string();
                app.update_config(|config| config.set_model(model))?;
                println!("✅ Model set to {}", app.model());
            }
            None => println!("🧠 Current model: {}", app.model()),
        },
        SlashCommand::System => match command.argument() {
            Some(arg) if arg.eq_ignore_ascii_case("clear") => {
                app.update_config(|config| config.set_system_instruction(None))?;
                println!("✅ System instruction cleared");
            }
            Some(text) => {
                let text = text.to_string();
                app.update_config(|config| config.set_system_instruction(Some(text)))?;
                println!("✅ System instruction saved");
            }
            None => match app.config().system_instruction.as_deref() {
                Some(text) => println!("📝 System instruction: {}", text),
                None => println!("📝 No system instruction set"),
            },
        },
        SlashCommand::Key => match command.argument() {
            Some(key) => {
                let key = key.to_string();
                app.update_config(|config| config.set_api_key(key))?;
                println!("✅ Settings Saved");
            }
            None if app.config().has_api_key() => println!("🔑 API key is configured"),
            None => println!("🔑 No API key yet. Use /key <value> or set {}", API_KEY_ENV),
        },
        SlashCommand::Image => match command.argument() {
            Some(arg) if arg.eq_ignore_ascii_case("clear") => {
                app.clear_image();
                println!("🗑️ Attachment removed");
            }
            Some(path) => match app.attach_image(&PathBuf::from(path)) {
                Ok(()) => println!("🖼️ Image attached to your next message"),
                Err(err) => println!("❌ {:#}", err),
            },
            None if app.pending_image().is_some() => println!("🖼️ An image is attached"),
            None => println!("Usage: /image <path> or /image clear"),
        },
        SlashCommand::Help => println!("{}", get_help_text()),
        SlashCommand::Bye => return Ok(ConversationAction::Exit),
    }

    Ok(ConversationAction::None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_prints_header_once_and_only_new_text() {
        let mut printer = ProgressPrinter::new(Vec::new());
        assert!(!printer.has_output());

        printer.update("Hel");
        printer.update("Hello");
        printer.update("Hello, wörld");

        assert!(printer.has_output());
        let shown = String::from_utf8(printer.out).unwrap();
        assert_eq!(shown, "🤖 Nova: Hello, wörld");
    }
}
