//! Interactive yes/no prompts on the controlling terminal.

use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use tfc2s3_pipeline::CommitApproval;

/// Asks on stdin. Concurrent pipelines take turns so questions never overlap.
#[derive(Debug, Default)]
pub struct TerminalApproval {
    turn: Mutex<()>,
}

impl TerminalApproval {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask `question`, returning `default` on an empty answer.
    pub async fn confirm(&self, question: String, default: bool) -> bool {
        let _turn = self.turn.lock().await;
        match tokio::task::spawn_blocking(move || ask(&question, default)).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "prompt task failed, treating as no");
                false
            }
        }
    }
}

#[async_trait]
impl CommitApproval for TerminalApproval {
    async fn approve(&self, repo: &str) -> bool {
        self.confirm(format!("Commit changes for {repo}?"), true)
            .await
    }
}

fn ask(question: &str, default: bool) -> bool {
    let hint = if default { "Y/n" } else { "y/N" };
    let mut stdout = io::stdout().lock();
    if write!(stdout, "{question} [{hint}]: ").and_then(|_| stdout.flush()).is_err() {
        return false;
    }
    drop(stdout);

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => false,
        Ok(_) => parse_answer(&line, default),
    }
}

/// `y`/`yes` in any case is yes, an empty line is `default`, anything else is no.
pub fn parse_answer(line: &str, default: bool) -> bool {
    match line.trim().to_ascii_lowercase().as_str() {
        "" => default,
        "y" | "yes" => true,
        _ => false,
    }
}
