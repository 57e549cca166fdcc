//! `toolweave conversations` — inspect and delete saved conversations.

use toolweave_core::message::{ConversationId, MessageMarker};
use toolweave_engine::ChatService;

use super::load_config;

fn service() -> Result<ChatService, Box<dyn std::error::Error>> {
    super::build_service(&load_config()?)
}

pub async fn list() -> Result<(), Box<dyn std::error::Error>> {
    let service = service()?;
    let conversations = service.list().await?;

    if conversations.is_empty() {
        println!("No saved conversations ({} store).", service.store_name());
        return Ok(());
    }

    println!("{} conversation(s):", conversations.len());
    println!();
    for summary in conversations {
        println!(
            "  {}  {}",
            summary.id,
            summary.updated_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M")
        );
        println!("      {}", summary.title.as_deref().unwrap_or("(untitled)"));
        if !summary.preview.is_empty() {
            println!("      > {}", summary.preview);
        }
        println!("      {} messages", summary.message_count);
    }
    Ok(())
}

pub async fn show(id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let service = service()?;
    let id = ConversationId::from(id);
    let conversation = service.get(&id).await?;

    println!("# {}", conversation.title.as_deref().unwrap_or("(untitled)"));
    println!("  id: {}", conversation.id);
    println!();

    for entry in service.transcript(&id).await? {
        let who = if entry.is_user { "You" } else { "Assistant" };
        for result in &entry.tool_results {
            let summary = result.summary.as_deref().unwrap_or("");
            println!("  [tool] {} {} -> {summary}", result.name, result.arguments);
        }
        if !entry.content.is_empty() {
            let suffix = match entry.marker {
                Some(MessageMarker::Partial) => "  [interrupted]",
                Some(MessageMarker::Failure) => "  [failed]",
                Some(MessageMarker::BudgetExhausted) => "  [round limit]",
                None => "",
            };
            println!("  {who} > {}{suffix}", entry.content);
        }
        println!();
    }
    Ok(())
}

pub async fn delete(id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let service = service()?;
    service.delete(&ConversationId::from(id)).await?;
    println!("Deleted conversation {id}");
    Ok(())
}
