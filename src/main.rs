// src/main.rs
use std::sync::Arc;

use codepad::banner;
use codepad::config::AppConfig;
use codepad::models::{Language, NormalizedResult};
use codepad::problems::ProblemDataStore;
use codepad::state::{SubmissionPhase, SubmissionStateProjector, WorkspaceState};
use codepad::{Result, Workspace};

/// Prints submission state changes for a terminal user.
struct ConsoleProjector;

impl SubmissionStateProjector for ConsoleProjector {
    fn project(&self, state: &WorkspaceState) {
        match state.phase {
            SubmissionPhase::Dispatching => println!("📤 Submitting..."),
            SubmissionPhase::Pending => println!("⏳ Submitted, waiting for the judge..."),
            SubmissionPhase::Idle | SubmissionPhase::DispatchFailed => print_result(&state.result),
        }
    }
}

fn print_result(result: &NormalizedResult) {
    match result {
        NormalizedResult::Empty => {}
        NormalizedResult::Plain { message } => println!("💬 {}", message),
        NormalizedResult::Structured { status, output } => {
            println!("⚖️  Status: {}", status);
            println!("📄 Output:\n{}", output);
        }
    }
}

#[tokio::main]
async fn main() {
    banner::print_banner();

    // a missing .env is fine, every setting has a default
    dotenvy::dotenv().ok();

    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Err(e) = run().await {
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = match std::env::var("CODEPAD_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?,
        Err(_) => AppConfig::from_env()?,
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    let client = reqwest::Client::builder().timeout(config.request_timeout).build()?;
    let store = ProblemDataStore::new(client, config.problems_api_base.clone());

    match args.as_slice() {
        [] => {
            let problems = store.list_problems().await?;
            println!("📚 {} problems", problems.len());
            for problem in problems {
                println!("{} - {} - Difficulty: {}", problem.id, problem.title, problem.difficulty);
            }
            Ok(())
        }
        [problem_id, source, rest @ ..] => {
            let language: Language = match rest.first() {
                Some(name) => name.parse()?,
                None => Language::default(),
            };
            let code = std::fs::read_to_string(source)?;

            let problem = store.get_problem(problem_id).await?;
            println!("📝 {}\n", problem.description);

            let workspace = Workspace::open(&config, problem_id.clone(), Some(Arc::new(ConsoleProjector))).await?;
            let since = workspace.state().revision;

            // a failed dispatch has already been projected as the fallback message
            if workspace.submit(code, language).await.is_ok() {
                if let Err(e) = workspace.wait_for_result_since(since, config.result_timeout).await {
                    println!("⚠️  {}", e);
                }
            }

            workspace.close().await;
            Ok(())
        }
        [_] => {
            eprintln!("usage: codepad [<problem-id> <source-file> [language]]");
            std::process::exit(2);
        }
    }
}
