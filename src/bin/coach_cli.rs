use guided_planner::workflow::state::MessageRole;
use guided_planner::workflow::{CoachState, SessionStatus, WorkflowState};
use guided_planner::{config::AppConfig, logging, AppState};
use std::io::{self, Write};

fn read_line(prompt: &str) -> io::Result<Option<String>> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    println!("🎓 AI Career & Learning Coach");
    println!("==========================================");

    let config = AppConfig::from_env();
    logging::init_logging("Career coach")?;

    let app = AppState::initialize(config).await?;
    let executor = &app.coach;

    let thread_id = match std::env::args().nth(1) {
        Some(id) => id,
        None => {
            let sessions = executor.list_sessions().await?;
            if !sessions.is_empty() {
                println!("Existing sessions (pass one as an argument to continue):");
                for id in &sessions {
                    println!("  {}", id);
                }
            }
            uuid::Uuid::new_v4().to_string()
        }
    };
    println!("Session ID: {}\n", thread_id);

    let mut snapshot = executor.inspect(&thread_id).await?;
    for message in snapshot.state.messages() {
        let who = match message.role {
            MessageRole::User => "you",
            MessageRole::Assistant => "coach",
        };
        println!("[{}] {}\n", who, message.content);
    }

    loop {
        let result = match snapshot.status {
            SessionStatus::New | SessionStatus::Completed => {
                if snapshot.is_completed() {
                    println!("🎉 Plan Approved! Good luck with your learning journey.");
                }
                let Some(input) = read_line("Tell me about your career goals and current skills (empty to quit): ")? else {
                    break;
                };
                if input.is_empty() {
                    break;
                }
                println!("\nStarting analysis...");
                executor.start(&thread_id, CoachState::input_update(input)).await
            }
            SessionStatus::Paused => {
                println!(
                    "\n**Learning Plan** (revision {}):\n\n{}\n",
                    snapshot.state.revision_count, snapshot.state.learning_plan
                );
                let Some(feedback) = read_line("Give feedback to adjust the plan, or type 'Approve' to finish: ")? else {
                    break;
                };
                println!("\nApplying feedback...");
                executor.resume(&thread_id, CoachState::feedback_update(feedback)).await
            }
            SessionStatus::Stranded => {
                let pending = snapshot.pending_step().unwrap_or("unknown");
                if read_line(&format!("Step '{}' failed. Press Enter to retry: ", pending))?.is_none() {
                    break;
                }
                executor.resume(&thread_id, CoachState::feedback_update(String::new())).await
            }
        };

        match result {
            Ok(report) => {
                for step in &report.executed {
                    println!("  Executed: {}", step);
                }
                snapshot = report.snapshot;
            }
            Err(e) if e.is_retryable() => {
                eprintln!("⚠️ {}", e);
                snapshot = executor.inspect(&thread_id).await?;
            }
            Err(e) => {
                eprintln!("❌ An error occurred: {}", e);
                break;
            }
        }
    }

    for row in app.execution_logger.get_logs_for_session(&thread_id).await? {
        println!("  {:<18} {:>7.2}s", row.node_name, row.duration);
    }
    Ok(())
}
