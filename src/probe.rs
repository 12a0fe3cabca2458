//! The `test` subcommand: exercises every configured (logical model ×
//! target) with canned chat, completion, and embedding probes, then prints
//! a human table or a JSON summary.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::api::openai::ChatMessage;
use crate::gateway_util::AppStateData;
use crate::inference::providers::ProviderClient;
use crate::inference::types::GenerationOptions;
use crate::state::target_key;

const PROBE_DEADLINE: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
pub struct MethodResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub latency: String,
}

#[derive(Debug, Serialize)]
pub struct TargetResult {
    pub model: String,
    pub target: String,
    pub chat: MethodResult,
    pub complete: MethodResult,
    pub embed: MethodResult,
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub total_tests: u32,
    pub passed: u32,
    pub failed: u32,
    pub results: Vec<TargetResult>,
}

impl Summary {
    fn count(&mut self, result: &MethodResult) {
        if result.success {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
    }
}

fn missing_provider() -> MethodResult {
    MethodResult {
        success: false,
        error: Some("provider not found".to_string()),
        latency: "0s".to_string(),
    }
}

async fn run_probe<F, Fut>(deadline: Instant, probe: F) -> MethodResult
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<(), crate::error::Error>>,
{
    let start = Instant::now();
    let result = tokio::time::timeout_at(deadline, probe()).await;
    let latency = format!("{:?}", start.elapsed());
    match result {
        Ok(Ok(())) => MethodResult {
            success: true,
            error: None,
            latency,
        },
        Ok(Err(e)) => MethodResult {
            success: false,
            error: Some(e.to_string()),
            latency,
        },
        Err(_) => MethodResult {
            success: false,
            error: Some("deadline exceeded".to_string()),
            latency,
        },
    }
}

async fn probe_target(
    state: &AppStateData,
    provider: &ProviderClient,
    upstream_model: &str,
    deadline: Instant,
) -> (MethodResult, MethodResult, MethodResult) {
    let options = GenerationOptions::default();
    let messages = vec![ChatMessage {
        role: "user".to_string(),
        content: "Hello, respond with 'OK' if you can read this.".to_string(),
        ..Default::default()
    }];

    let chat = run_probe(deadline, || async {
        provider
            .chat(&state.http_client, upstream_model, &messages, &options)
            .await
            .map(|_| ())
    })
    .await;

    let complete = run_probe(deadline, || async {
        provider
            .complete(
                &state.http_client,
                upstream_model,
                "Say 'OK' if you can read this.",
                &options,
            )
            .await
            .map(|_| ())
    })
    .await;

    let embed = run_probe(deadline, || async {
        let inputs = vec!["test".to_string(), "hello world".to_string()];
        provider
            .embed(&state.http_client, upstream_model, &inputs)
            .await
            .map(|_| ())
    })
    .await;

    (chat, complete, embed)
}

/// Probes every (logical model × target), or only `model_filter`'s chain.
pub async fn run(state: &AppStateData, model_filter: Option<&str>) -> Summary {
    let mut summary = Summary {
        total_tests: 0,
        passed: 0,
        failed: 0,
        results: Vec::new(),
    };
    let deadline = Instant::now() + PROBE_DEADLINE;

    let mut models: Vec<(&String, &Vec<crate::config::ModelTarget>)> = state
        .config
        .models
        .iter()
        .filter(|(name, _)| model_filter.map(|f| f == name.as_str()).unwrap_or(true))
        .collect();
    models.sort_by_key(|(name, _)| name.clone());

    for (model_name, chain) in models {
        tracing::info!(model = %model_name, "Testing model");
        for target in chain {
            let key = target_key(&target.provider, &target.model);
            summary.total_tests += 1;
            tracing::info!(backend = %key, "Testing target");

            let (chat, complete, embed) = match state.providers.get(&target.provider) {
                Some(provider) => {
                    probe_target(state, provider, &target.model, deadline).await
                }
                None => {
                    tracing::error!(provider = %target.provider, "Provider not found");
                    (missing_provider(), missing_provider(), missing_provider())
                }
            };

            for (name, result) in [("chat", &chat), ("complete", &complete), ("embed", &embed)] {
                summary.count(result);
                if result.success {
                    tracing::info!(backend = %key, latency = %result.latency, "{name} probe passed");
                } else {
                    tracing::error!(
                        backend = %key,
                        error = result.error.as_deref().unwrap_or(""),
                        "{name} probe failed"
                    );
                }
            }

            summary.results.push(TargetResult {
                model: model_name.clone(),
                target: key,
                chat,
                complete,
                embed,
            });
        }
    }

    summary
}

fn print_method(name: &str, result: &MethodResult) {
    let status = if result.success { "PASS" } else { "FAIL" };
    println!("  {name:<10} [{status}] {}", result.latency);
    if let Some(error) = &result.error {
        println!("             Error: {error}");
    }
}

pub fn print_text(summary: &Summary) {
    println!();
    println!("==============================================");
    println!("           Model Test Results                ");
    println!("==============================================");
    println!();

    for result in &summary.results {
        println!("Model: {} | Target: {}", result.model, result.target);
        println!("{}", "-".repeat(50));
        print_method("Chat:", &result.chat);
        print_method("Complete:", &result.complete);
        print_method("Embed:", &result.embed);
        println!();
    }

    println!("==============================================");
    println!(
        "Total: {} | Passed: {} | Failed: {}",
        summary.total_tests, summary.passed, summary.failed
    );
    println!("==============================================");
}

pub fn print_json(summary: &Summary) -> Result<(), crate::error::Error> {
    let rendered = serde_json::to_string_pretty(summary).map_err(|e| {
        crate::error::Error::new(crate::error::ErrorDetails::Serialization {
            message: format!("Failed to serialize test summary: {e}"),
        })
    })?;
    println!("{rendered}");
    Ok(())
}
