// src/repl.rs
//
// Terminal front end. Reads lines from stdin and listens on the event bus at
// the same time, so `/cancel` works while a reply is streaming.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use crate::commands;
use crate::error::AppError;
use crate::parser::{parse_message, ParsedMessage};
use crate::render::markdown::render_blocks;
use crate::render::{blocks_terminal, render_message, Body, ThinkingState};
use crate::settings::{MessageDisplayDensity, PreferredLanguage};
use crate::state::AppState;
use crate::types::{ChatEvent, Message, ToastKind};

const HELP: &str = "\
/new                      start a new chat
/chats                    list chats grouped by day
/open <id>                switch to a chat (id prefix is enough)
/rename <title>           rename the current chat
/delete [id]              delete a chat and its messages
/show                     reprint the current chat
/think                    expand or collapse the last reasoning section
/cancel                   stop the reply being generated
/config <base-url> <key>  save the API endpoint and check its models
/models                   list models at the endpoint
/model <id>               select a model
/profile [name]           show or change your username
/avatar <file>|clear      set or clear your profile picture
/settings [density|language] [value]
/export [file]            write the chat as HTML
/quit";

struct Labels {
    you: &'static str,
    assistant: &'static str,
    thinking: &'static str,
}

fn labels(language: PreferredLanguage) -> Labels {
    match language {
        PreferredLanguage::English => Labels {
            you: "You",
            assistant: "Assistant",
            thinking: "Thinking",
        },
        PreferredLanguage::Spanish => Labels {
            you: "Tú",
            assistant: "Asistente",
            thinking: "Pensando",
        },
    }
}

const FENCE: &str = "```";

/// Tracks how much of a streaming message has been printed. Parsed text only
/// grows as deltas arrive, so each update prints the new suffix. Prose goes
/// out as it arrives; a code fence is held until it closes and then printed
/// highlighted.
#[derive(Debug, Default)]
struct StreamPrinter {
    message_id: String,
    reasoning: usize,
    final_text: usize,
}

impl StreamPrinter {
    fn new(message_id: &str) -> Self {
        Self {
            message_id: message_id.to_string(),
            ..Self::default()
        }
    }

    fn update(&mut self, parsed: &ParsedMessage, thinking_label: &str) -> String {
        self.print(parsed, thinking_label, false)
    }

    /// Prints whatever is still held back, including an unterminated fence.
    fn finish(&mut self, parsed: &ParsedMessage, thinking_label: &str) -> String {
        self.print(parsed, thinking_label, true)
    }

    fn print(&mut self, parsed: &ParsedMessage, thinking_label: &str, done: bool) -> String {
        let mut out = String::new();

        if let Some(reasoning) = parsed.reasoning.as_deref() {
            if self.reasoning == 0 && !reasoning.is_empty() {
                out.push_str(&format!("[{thinking_label}] "));
            }
            out.push_str(suffix(reasoning, &mut self.reasoning));
        }

        let first = self.final_text == 0;
        let body = self.drain_final(&parsed.final_text, done);
        if first && !body.is_empty() && self.reasoning > 0 {
            out.push_str("\n\n");
        }
        out.push_str(&body);
        out
    }

    fn drain_final(&mut self, text: &str, done: bool) -> String {
        let mut out = String::new();
        loop {
            let pos = self.final_text;
            if pos >= text.len() || !text.is_char_boundary(pos) {
                return out;
            }
            match fence_start(text, pos) {
                Some(start) if start == pos => {
                    let end = match fence_end(text, start, done) {
                        Some(end) => end,
                        None if done => text.len(),
                        None => return out,
                    };
                    out.push_str(&blocks_terminal(&render_blocks(&text[start..end])));
                    self.final_text = end;
                }
                Some(start) => {
                    out.push_str(&text[pos..start]);
                    self.final_text = start;
                }
                None => {
                    let end = if done { text.len() } else { prose_end(text, pos) };
                    out.push_str(&text[pos..end]);
                    self.final_text = end;
                    return out;
                }
            }
        }
    }
}

fn suffix<'a>(text: &'a str, printed: &mut usize) -> &'a str {
    if *printed > text.len() || !text.is_char_boundary(*printed) {
        return "";
    }
    let rest = &text[*printed..];
    *printed = text.len();
    rest
}

fn at_line_start(text: &str, pos: usize) -> bool {
    pos == 0 || text[..pos].ends_with('\n')
}

fn opens_fence(line: &str) -> bool {
    line.trim_start().starts_with(FENCE)
}

fn closes_fence(line: &str) -> bool {
    let line = line.trim();
    line.len() >= FENCE.len() && line.bytes().all(|b| b == b'`')
}

/// Offset of the first line at or after `from` that opens a fence.
fn fence_start(text: &str, from: usize) -> Option<usize> {
    let mut at = from;
    for (i, line) in text[from..].split_inclusive('\n').enumerate() {
        if (i > 0 || at_line_start(text, from)) && opens_fence(line) {
            return Some(at);
        }
        at += line.len();
    }
    None
}

/// Offset just past the line closing the fence opened at `start`. A closing
/// line counts once its newline arrives, or at end of input when `done`.
fn fence_end(text: &str, start: usize, done: bool) -> Option<usize> {
    let mut lines = text[start..].split_inclusive('\n');
    let opening = lines.next()?;
    if !opening.ends_with('\n') {
        return None;
    }
    let mut at = start + opening.len();
    for line in lines {
        at += line.len();
        if closes_fence(line) && (line.ends_with('\n') || done) {
            return Some(at);
        }
    }
    None
}

/// How far prose starting at `pos` can be printed. A trailing line that may
/// still grow into a fence waits.
fn prose_end(text: &str, pos: usize) -> usize {
    let tail = match text[pos..].rfind('\n') {
        Some(i) => pos + i + 1,
        None if at_line_start(text, pos) => pos,
        None => return text.len(),
    };
    if FENCE.starts_with(text[tail..].trim_start()) {
        tail
    } else {
        text.len()
    }
}

/// First eight characters of an id, for listings and file names.
fn short_id(id: &str) -> &str {
    id.char_indices().nth(8).map_or(id, |(i, _)| &id[..i])
}

pub struct Repl {
    state: Arc<AppState>,
    chat_id: String,
    thinking: ThinkingState,
    printer: Option<StreamPrinter>,
}

enum Flow {
    Continue,
    Quit,
}

impl Repl {
    pub fn new(state: Arc<AppState>, chat_id: Option<String>) -> Self {
        Self {
            state,
            chat_id: chat_id.unwrap_or_else(commands::new_chat),
            thinking: ThinkingState::new(),
            printer: None,
        }
    }

    pub async fn run(mut self) -> Result<(), AppError> {
        let mut events = self.state.subscribe();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        println!("parley: type a message, or /help for commands.");
        if !commands::get_config(&self.state).is_ready() {
            println!("No API endpoint configured yet. Use /config <base-url> <api-key>.");
        }
        self.show_chat();
        self.prompt();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    if let Flow::Quit = self.handle_line(line.trim()).await {
                        break;
                    }
                    if self.printer.is_none() {
                        self.prompt();
                    }
                }
                event = events.recv() => match event {
                    Ok(event) => self.on_event(event),
                    Err(RecvError::Lagged(n)) => tracing::warn!("[repl] dropped {n} events"),
                    Err(RecvError::Closed) => break,
                },
            }
        }

        commands::cancel_generation(&self.state, &self.chat_id);
        Ok(())
    }

    fn labels(&self) -> Labels {
        labels(commands::get_settings(&self.state).preferred_language)
    }

    fn prompt(&self) {
        print!("{}> ", commands::get_profile(&self.state).username);
        let _ = std::io::stdout().flush();
    }

    fn on_event(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::Begin { chat_id, message_id } if chat_id == self.chat_id => {
                print!("{}: ", self.labels().assistant);
                let _ = std::io::stdout().flush();
                self.printer = Some(StreamPrinter::new(&message_id));
            }
            ChatEvent::Delta { chat_id, message_id, .. } if chat_id == self.chat_id => {
                self.thinking.observe(&message_id, true);
                let Some(printer) = self.printer.as_mut().filter(|p| p.message_id == message_id) else {
                    return;
                };
                let messages = commands::get_chat_messages(&self.state, &chat_id);
                let Some(message) = messages.iter().find(|m| m.id == message_id) else {
                    return;
                };
                let out = printer.update(&parse_message(&message.content, true), labels_for(&self.state).thinking);
                print!("{out}");
                let _ = std::io::stdout().flush();
            }
            ChatEvent::End { chat_id, message_id, duration_ms } if chat_id == self.chat_id => {
                self.finish_printer(&message_id);
                println!("\n({:.1}s)", duration_ms as f64 / 1000.0);
                self.prompt();
            }
            ChatEvent::Failed { chat_id, message_id, .. } if chat_id == self.chat_id => {
                self.finish_printer(&message_id);
                println!();
                self.prompt();
            }
            ChatEvent::ConfigRequired { .. } => {
                println!("Configure an endpoint first: /config <base-url> <api-key>");
            }
            ChatEvent::Toast(toast) => {
                let tag = match toast.kind {
                    ToastKind::Success => "ok",
                    ToastKind::Error => "error",
                    ToastKind::Info => "info",
                };
                println!("[{tag}] {}", toast.message);
            }
            _ => {}
        }
    }

    /// Prints what the stream printer still holds for `message_id`, if the
    /// message survived.
    fn finish_printer(&mut self, message_id: &str) {
        let Some(mut printer) = self.printer.take().filter(|p| p.message_id == message_id) else {
            return;
        };
        let messages = commands::get_chat_messages(&self.state, &self.chat_id);
        if let Some(message) = messages.iter().find(|m| m.id == message_id) {
            print!("{}", printer.finish(&parse_message(&message.content, false), self.labels().thinking));
        }
    }

    async fn handle_line(&mut self, line: &str) -> Flow {
        if line.is_empty() {
            return Flow::Continue;
        }
        let Some(command) = line.strip_prefix('/') else {
            self.send(line);
            return Flow::Continue;
        };

        let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
        let rest = rest.trim();
        let result = match name {
            "quit" | "exit" => return Flow::Quit,
            "help" => {
                println!("{HELP}");
                Ok(())
            }
            "new" => {
                self.chat_id = commands::new_chat();
                println!("Started a new chat.");
                Ok(())
            }
            "chats" => {
                self.list_chats();
                Ok(())
            }
            "open" => {
                self.open(rest);
                Ok(())
            }
            "show" => {
                self.show_chat();
                Ok(())
            }
            "think" => {
                self.toggle_thinking();
                Ok(())
            }
            "rename" => commands::rename_chat(&self.state, &self.chat_id, rest).map(|_| ()).map_err(AppError::from),
            "delete" => self.delete(rest),
            "cancel" => {
                if !commands::cancel_generation(&self.state, &self.chat_id) {
                    println!("Nothing is generating.");
                }
                Ok(())
            }
            "config" => self.configure(rest).await,
            "models" => self.models().await,
            "model" => commands::select_model(&self.state, rest).map_err(AppError::from),
            "profile" => self.profile(rest),
            "avatar" => self.avatar(rest),
            "settings" => self.settings(rest),
            "export" => self.export(rest),
            other => {
                println!("Unknown command /{other}. Try /help.");
                Ok(())
            }
        };

        if let Err(e) = result {
            println!("[error] {e}");
        }
        Flow::Continue
    }

    fn send(&mut self, text: &str) {
        match commands::send_message(&self.state, &self.chat_id, text) {
            Ok(_) => {}
            Err(e) => println!("[error] {e}"),
        }
    }

    fn list_chats(&self) {
        let groups = commands::list_chats(&self.state);
        if groups.is_empty() {
            println!("No chats yet.");
        }
        for (group, chats) in groups {
            println!("{}", group.label());
            for chat in chats {
                let marker = if chat.id == self.chat_id { '*' } else { ' ' };
                println!(" {marker} {}  {}", short_id(&chat.id), chat.title);
            }
        }
    }

    fn resolve(&self, prefix: &str) -> Option<String> {
        let history = commands::list_chats(&self.state);
        let mut matches = history
            .into_iter()
            .flat_map(|(_, chats)| chats)
            .filter(|c| c.id.starts_with(prefix));
        let first = matches.next()?;
        if matches.next().is_some() {
            println!("'{prefix}' matches more than one chat.");
            return None;
        }
        Some(first.id)
    }

    fn open(&mut self, prefix: &str) {
        if prefix.is_empty() {
            println!("Usage: /open <id>");
            return;
        }
        match self.resolve(prefix) {
            Some(id) => {
                self.chat_id = id;
                self.show_chat();
            }
            None => println!("No chat matches '{prefix}'."),
        }
    }

    fn delete(&mut self, prefix: &str) -> Result<(), AppError> {
        let target = if prefix.is_empty() {
            self.chat_id.clone()
        } else {
            match self.resolve(prefix) {
                Some(id) => id,
                None => {
                    println!("No chat matches '{prefix}'.");
                    return Ok(());
                }
            }
        };

        commands::delete_chat(&self.state, &target)?;
        if target == self.chat_id {
            self.chat_id = commands::new_chat();
            self.printer = None;
        }
        println!("Chat deleted.");
        Ok(())
    }

    fn show_chat(&self) {
        let messages = commands::get_chat_messages(&self.state, &self.chat_id);
        let compact = commands::get_settings(&self.state).message_display_density == MessageDisplayDensity::Compact;
        let labels = self.labels();

        for message in &messages {
            print_message(message, &self.thinking, &labels);
            if !compact {
                println!();
            }
        }
    }

    fn toggle_thinking(&mut self) {
        let messages = commands::get_chat_messages(&self.state, &self.chat_id);
        let last = messages
            .iter()
            .rev()
            .find(|m| !m.is_user() && parse_message(&m.content, m.streaming).reasoning.is_some());
        match last {
            Some(message) => {
                self.thinking.toggle(&message.id);
                print_message(message, &self.thinking, &self.labels());
            }
            None => println!("No reasoning to show."),
        }
    }

    async fn configure(&mut self, args: &str) -> Result<(), AppError> {
        let mut parts = args.split_whitespace();
        let (Some(base_url), Some(api_key)) = (parts.next(), parts.next()) else {
            println!("Usage: /config <base-url> <api-key>");
            return Ok(());
        };

        commands::save_config(&self.state, base_url, api_key)?;
        // Failures are reported as toasts.
        if let Ok(models) = commands::check_models(&self.state).await {
            if let Some(first) = models.first() {
                println!("Selected model: {}", first.id);
            }
        }
        Ok(())
    }

    async fn models(&self) -> Result<(), AppError> {
        let models = commands::check_models(&self.state).await?;
        let selected = commands::get_config(&self.state).selected_model;
        for model in models {
            let marker = if model.id == selected { '*' } else { ' ' };
            println!(" {marker} {}", model.id);
        }
        Ok(())
    }

    fn profile(&self, name: &str) -> Result<(), AppError> {
        if !name.is_empty() {
            commands::update_username(&self.state, name)?;
            return Ok(());
        }
        let profile = commands::get_profile(&self.state);
        println!("Username: {}", profile.username);
        println!("User id:  {}", profile.user_id);
        println!(
            "Avatar:   {}",
            if profile.profile_picture.is_some() { "set" } else { "none" }
        );
        Ok(())
    }

    fn avatar(&self, arg: &str) -> Result<(), AppError> {
        match arg {
            "" => println!("Usage: /avatar <file>|clear"),
            "clear" => commands::clear_avatar(&self.state)?,
            path => {
                commands::set_avatar_from_file(&self.state, Path::new(path))?;
            }
        }
        Ok(())
    }

    fn settings(&self, args: &str) -> Result<(), AppError> {
        let mut parts = args.split_whitespace();
        match (parts.next(), parts.next()) {
            (None, _) => {
                let settings = commands::get_settings(&self.state);
                println!("density:  {}", settings.message_display_density);
                println!("language: {}", settings.preferred_language);
            }
            (Some("density"), Some(value)) => match value.parse() {
                Ok(density) => commands::set_density(&self.state, density)?,
                Err(e) => println!("{e}"),
            },
            (Some("language"), Some(value)) => match value.parse() {
                Ok(language) => commands::set_language(&self.state, language)?,
                Err(e) => println!("{e}"),
            },
            (Some("reset"), None) => commands::reset_settings(&self.state)?,
            _ => println!("Usage: /settings [density <comfortable|compact> | language <english|spanish> | reset]"),
        }
        Ok(())
    }

    fn export(&self, path: &str) -> Result<(), AppError> {
        let Some(html) = commands::export_chat(&self.state, &self.chat_id) else {
            println!("Nothing to export yet.");
            return Ok(());
        };
        let path = if path.is_empty() {
            format!("chat-{}.html", short_id(&self.chat_id))
        } else {
            path.to_string()
        };
        std::fs::write(&path, html)?;
        println!("Wrote {path}");
        Ok(())
    }
}

fn labels_for(state: &AppState) -> Labels {
    labels(commands::get_settings(state).preferred_language)
}

fn print_message(message: &Message, thinking: &ThinkingState, labels: &Labels) {
    let rendered = render_message(message, thinking);
    match rendered.body {
        Body::Plain(text) => println!("{}: {text}", labels.you),
        Body::Typing => println!("{}: ...", labels.assistant),
        Body::Rendered { thinking: section, blocks } => {
            println!("{}:", labels.assistant);
            if let Some(section) = section {
                if section.expanded {
                    println!("  [{} - {}]", labels.thinking, section.badge());
                    for line in blocks_terminal(&section.blocks).lines() {
                        println!("  | {line}");
                    }
                } else {
                    println!("  [{} - {}] (/think to expand)", labels.thinking, section.badge());
                }
            }
            print!("{}", blocks_terminal(&blocks));
        }
    }
}
