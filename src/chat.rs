// Terminal chat session. Uses the same controller and gateway as the web
// dashboard.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::conversation::{self, ChatMessage, Conversation, Role};
use crate::gateway::Gateway;
use crate::markup;

const PROMPT: &str = "Anda> ";
const EXIT_WORDS: [&str; 3] = ["keluar", "exit", "quit"];

async fn print_message<W: AsyncWrite + Unpin>(out: &mut W, message: &ChatMessage) -> Result<()> {
    let line = match message.role {
        Role::Assistant => format!("BOMBAbot> {}\n\n", markup::to_terminal(&message.content)),
        Role::User => format!("{}{}\n", PROMPT, message.content),
    };
    out.write_all(line.as_bytes()).await?;
    out.flush().await?;
    Ok(())
}

/// Reads questions line by line until EOF or an exit word.
pub async fn run_chat<R, W>(
    conversation: &Mutex<Conversation>,
    gateway: &Gateway,
    input: R,
    mut out: W,
) -> Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    {
        let conversation = conversation.lock().await;
        let header = format!(
            "Dataset: {} Balai Nasional. Taip 'keluar' untuk tamat.\n\n",
            conversation.station_count()
        );
        out.write_all(header.as_bytes()).await?;
        for message in conversation.history() {
            print_message(&mut out, message).await?;
        }
    }

    let mut lines = BufReader::new(input).lines();
    loop {
        out.write_all(PROMPT.as_bytes()).await?;
        out.flush().await?;

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&question.to_lowercase().as_str()) {
            break;
        }

        out.write_all("Menyemak Data...\n".as_bytes()).await?;
        out.flush().await?;
        match conversation::submit(conversation, gateway, &line).await {
            Ok(reply) => print_message(&mut out, &reply).await?,
            Err(e) => warn!("Question not accepted: {}", e),
        }
    }

    info!("Chat session ended");
    out.write_all("Terima kasih kerana menggunakan BOMBAbot!\n".as_bytes())
        .await?;
    out.flush().await?;
    Ok(())
}

/// Interactive session on stdin/stdout.
pub async fn run_interactive_chat(conversation: &Mutex<Conversation>, gateway: &Gateway) -> Result<()> {
    run_chat(conversation, gateway, tokio::io::stdin(), tokio::io::stdout()).await
}
