//! Command-line driver: start a run against the fixture dataset, rule on
//! proposed actions interactively (or with --approve-all), and print the
//! synthesis.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use opsmith_core::{Engine, EngineConfig};
use opsmith_observability::{canonical_logs_dir_from_root, init_process_logging, ProcessKind};
use opsmith_types::{ActionDecision, ActionFilter, ActionStatus, RunStatus};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut approve_all = false;
    let mut words = Vec::new();
    for arg in std::env::args().skip(1) {
        if arg == "--approve-all" {
            approve_all = true;
        } else {
            words.push(arg);
        }
    }
    let request = if words.is_empty() {
        "Give me a status report".to_string()
    } else {
        words.join(" ")
    };

    let config = EngineConfig::load(None).await?;
    let logs_dir = canonical_logs_dir_from_root(&config.data_dir);
    let (_guard, info) = init_process_logging(ProcessKind::Cli, &logs_dir, 14)?;
    tracing::info!(logs_dir = %info.logs_dir, prefix = %info.prefix, "logging ready");

    let engine = Engine::with_fixture(config).await?;
    let run_id = engine.start_run(&request).await?;
    println!("run {run_id}: {request}");

    loop {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let snapshot = engine.run_snapshot(&run_id).await?;
        if snapshot.status == RunStatus::WaitingHuman {
            let pending = engine
                .pending_actions(&ActionFilter {
                    run_id: Some(run_id.clone()),
                    status: Some(ActionStatus::Pending),
                })
                .await;
            for action in pending {
                println!(
                    "proposed {} by {}: {}",
                    action.action_type, action.worker, action.reasoning
                );
                let decision = if approve_all {
                    ActionDecision::Approve
                } else {
                    prompt_decision()?
                };
                engine.decide_action(&action.id, decision).await?;
            }
            continue;
        }
        if snapshot.status.is_terminal() {
            match snapshot.status {
                RunStatus::Completed => {
                    println!("{}", snapshot.synthesis.unwrap_or_default());
                }
                RunStatus::Failed => {
                    println!(
                        "run failed: {}",
                        snapshot.failure_reason.unwrap_or_default()
                    );
                }
                _ => println!("run cancelled"),
            }
            return Ok(());
        }
    }
}

fn prompt_decision() -> anyhow::Result<ActionDecision> {
    print!("approve? [y/N] ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(if line.trim().eq_ignore_ascii_case("y") {
        ActionDecision::Approve
    } else {
        ActionDecision::Reject
    })
}
