//! Terminal implementation of the UI boundary

use async_trait::async_trait;
use counsel_core::{cancelled_error, CounselResult, QuestionPrompt, UiBridge};
use std::io::Write;

/// Blocking stdin/stdout bridge for interactive sessions
pub struct TerminalUi;

#[async_trait]
impl UiBridge for TerminalUi {
    async fn present_question(&self, question: &QuestionPrompt) -> CounselResult<String> {
        let text = question.text.clone();
        let answer = tokio::task::spawn_blocking(move || {
            println!();
            println!("❓ {}", text);
            print!("> ");
            let _ = std::io::stdout().flush();

            let mut line = String::new();
            match std::io::stdin().read_line(&mut line) {
                Ok(0) => None,
                Ok(_) => Some(line.trim().to_string()),
                Err(_) => None,
            }
        })
        .await
        .ok()
        .flatten();

        match answer {
            // EOF or read failure means the user walked away
            None => Err(cancelled_error!("present_question", "terminal_ui")),
            Some(answer) if answer.eq_ignore_ascii_case("quit") => {
                Err(cancelled_error!("present_question", "terminal_ui"))
            }
            Some(answer) => Ok(answer),
        }
    }

    fn report_progress(&self, stage_index: usize, stage_name: &str, percent: f64) {
        println!(
            "📊 Stage {}/6: {} [{}%]",
            stage_index,
            stage_name,
            (percent * 100.0).round() as u32
        );
    }
}
