//! `toolweave chat` — interactive or single-message chat.
//!
//! Replies stream to stdout as they arrive. Ctrl+C interrupts the running
//! turn; whatever the model produced so far is kept as a partial message.

use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use toolweave_core::message::ConversationId;
use toolweave_core::tool::ToolStatus;
use toolweave_engine::{ChatService, ServiceError, TurnEvent, TurnHandle, TurnPhase};

use super::{build_service, load_config};

const HELP: &str = "  Commands:
    /new          start a new conversation
    /regenerate   answer the last message again
    /delete-last  remove the last exchange
    /list         list saved conversations
    /help         show this help
    /exit         quit";

pub async fn run(
    message: Option<String>,
    conversation: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let service = build_service(&config)?;
    let mut current = conversation.map(|id| ConversationId::from(&id));

    if let Some(msg) = message {
        let handle = service.send_message(current, &msg, None).await?;
        let phase = stream_turn(&service, handle).await?;
        if phase == TurnPhase::Failed {
            return Err("Turn failed".into());
        }
        return Ok(());
    }

    println!();
    println!("  toolweave — interactive chat");
    println!();
    println!("  Provider:  {}", service.provider_name());
    println!("  Model:     {}", service.model());
    let tools: Vec<String> = service.tool_definitions().into_iter().map(|t| t.name).collect();
    println!("  Tools:     {}", tools.join(", "));
    if let Some(id) = &current {
        println!("  Continuing conversation {id}");
    }
    println!();
    println!("  Type your message and press Enter. /help lists commands.");
    println!("  Ctrl+C interrupts a reply.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;

    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            prompt()?;
            continue;
        }

        let started = match input {
            "/exit" | "/quit" | "exit" => break,
            "/help" => {
                println!("{HELP}");
                None
            }
            "/new" => {
                current = None;
                println!("  Started a new conversation.");
                None
            }
            "/list" => {
                print_list(&service).await;
                None
            }
            "/delete-last" => {
                match &current {
                    Some(id) => match service.delete_last(id).await {
                        Ok(conv) => println!("  Removed the last exchange ({} messages left).", conv.messages.len()),
                        Err(e) => eprintln!("  [Error] {e}"),
                    },
                    None => println!("  Nothing to delete yet."),
                }
                None
            }
            "/regenerate" => match &current {
                Some(id) => Some(service.regenerate(id).await),
                None => {
                    println!("  Nothing to regenerate yet.");
                    None
                }
            },
            text => Some(service.send_message(current.clone(), text, None).await),
        };

        match started {
            Some(Ok(handle)) => {
                current = Some(handle.conversation_id.clone());
                println!();
                stream_turn(&service, handle).await?;
                println!();
            }
            Some(Err(e)) => eprintln!("  [Error] {e}"),
            None => {}
        }
        prompt()?;
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

/// Print a turn's events until it ends. Ctrl+C interrupts the turn.
async fn stream_turn(
    service: &ChatService,
    mut handle: TurnHandle,
) -> Result<TurnPhase, Box<dyn std::error::Error>> {
    let mut interrupted = false;
    let mut at_line_start = true;

    loop {
        tokio::select! {
            event = handle.events.recv() => {
                let Some(event) = event else { break };
                let mut out = std::io::stdout();
                render(&mut out, &event, &mut at_line_start)?;
                out.flush()?;
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = service.interrupt(&handle.conversation_id);
            }
        }
    }
    if !at_line_start {
        println!();
    }

    let report = handle.completion.await.map_err(|e| format!("Turn task failed: {e}"))?;
    tracing::debug!(
        conversation_id = %report.conversation_id,
        phase = ?report.phase,
        rounds = report.rounds,
        "Turn finished"
    );
    Ok(report.phase)
}

fn render(out: &mut impl Write, event: &TurnEvent, at_line_start: &mut bool) -> std::io::Result<()> {
    match event {
        TurnEvent::Content { content } => {
            if *at_line_start {
                write!(out, "  Assistant > ")?;
            }
            write!(out, "{content}")?;
            *at_line_start = content.ends_with('\n');
        }
        TurnEvent::ToolStarted { name, arguments, .. } => {
            if !*at_line_start {
                writeln!(out)?;
            }
            writeln!(out, "  [tool] {name} {arguments}")?;
            *at_line_start = true;
        }
        TurnEvent::ToolFinished { name, status, summary, .. } => {
            if !*at_line_start {
                writeln!(out)?;
                *at_line_start = true;
            }
            let mark = match status {
                ToolStatus::Ok => "ok",
                ToolStatus::Error => "error",
            };
            writeln!(out, "  [tool] {name} {mark}: {summary}")?;
        }
        TurnEvent::TurnFinished { phase, title, .. } => {
            if !*at_line_start {
                writeln!(out)?;
                *at_line_start = true;
            }
            if *phase == TurnPhase::Cancelled {
                writeln!(out, "  [interrupted]")?;
            }
            if let Some(title) = title {
                writeln!(out, "  [title] {title}")?;
            }
        }
        TurnEvent::TurnError { message, .. } => {
            if !*at_line_start {
                writeln!(out)?;
                *at_line_start = true;
            }
            eprintln!("  [Error] {message}");
        }
    }
    Ok(())
}

async fn print_list(service: &ChatService) {
    match service.list().await {
        Ok(list) if list.is_empty() => println!("  No saved conversations."),
        Ok(list) => {
            for summary in list {
                println!(
                    "  {}  {}  ({} messages)",
                    summary.id,
                    summary.title.as_deref().unwrap_or(&summary.preview),
                    summary.message_count
                );
            }
        }
        Err(ServiceError::Store(e)) => eprintln!("  [Store Error] {e}"),
        Err(e) => eprintln!("  [Error] {e}"),
    }
}
