use guided_planner::{config::AppConfig, logging, AppState};
use guided_planner::workflow::{SessionStatus, TravelState, WorkflowState};
use std::io::{self, Write};

/// Prompt and read one trimmed line; `None` on end of input
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
    println!("--- 🌍 AI TRAVEL ASSISTANT ---");

    let config = AppConfig::from_env();
    logging::init_logging("Travel assistant")?;

    let app = AppState::initialize(config).await?;
    let executor = &app.travel;

    // Separate thread ids keep separate trips
    let thread_id = std::env::args().nth(1).unwrap_or_else(|| "session_1".to_string());
    let mut snapshot = executor.inspect(&thread_id).await?;

    match snapshot.status {
        SessionStatus::Paused => println!("\nResuming trip to {} ({})", snapshot.state.location, thread_id),
        SessionStatus::Stranded => println!("\nSession {} stopped on an error; it will be retried.", thread_id),
        SessionStatus::New | SessionStatus::Completed => {
            let Some(location) = read_line("Where do you want to go? (Try 'London' for rain logic): ")? else {
                return Ok(());
            };

            println!("\n--- Starting Workflow ---");
            match executor.start(&thread_id, TravelState::input_update(location)).await {
                Ok(report) => snapshot = report.snapshot,
                Err(e) if e.is_retryable() => {
                    eprintln!("⚠️ {}", e);
                    snapshot = executor.inspect(&thread_id).await?;
                }
                Err(e) => {
                    eprintln!("❌ {}", e);
                    return Ok(());
                }
            }
        }
    }

    loop {
        let input = match snapshot.status {
            SessionStatus::Completed => {
                println!("\n✅ Plan Approved! Enjoy your trip.");
                break;
            }
            SessionStatus::Stranded => {
                let pending = snapshot.pending_step().unwrap_or("unknown");
                match read_line(&format!("\nStep '{}' failed. Press Enter to retry: ", pending))? {
                    Some(_) => String::new(),
                    None => break,
                }
            }
            _ => {
                println!(
                    "\n\n--- 📝 PROPOSED ITINERARY FOR {} (weather: {}, revision {}) ---",
                    snapshot.state.location.to_uppercase(),
                    snapshot.state.weather,
                    snapshot.state.revision_count
                );
                println!("{}", snapshot.state.itinerary);
                println!("------------------------------------------------");

                match read_line("\nType 'APPROVE' to finish, or type your feedback to change the plan: ")? {
                    Some(line) if line.eq_ignore_ascii_case("APPROVE") => "APPROVE".to_string(),
                    Some(line) => {
                        println!("\n🔄 Sending feedback to AI...");
                        line
                    }
                    None => break,
                }
            }
        };

        match executor.resume(&thread_id, TravelState::feedback_update(input)).await {
            Ok(report) => snapshot = report.snapshot,
            Err(e) if e.is_retryable() => {
                eprintln!("⚠️ {}", e);
                snapshot = executor.inspect(&thread_id).await?;
            }
            Err(e) => return Err(e.into()),
        }
    }

    println!("\n{} message(s) recorded for {}.", snapshot.state.messages().len(), thread_id);
    Ok(())
}
