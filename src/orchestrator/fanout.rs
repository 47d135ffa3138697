// src/orchestrator/fanout.rs

//! Concurrent execution of one wave of stages.

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::dag::Stage;
use crate::errors::{CloudrefError, Result};

/// Run `branch` for every stage concurrently and wait for all of them.
///
/// Each branch reports exactly one result on a channel sized to the number of
/// branches. Siblings are never cancelled: a failure is only reported once
/// every branch finished. The first error received wins and is returned as
/// `BranchFailed`; successes come back in completion order.
pub async fn run_wave<T, F, Fut>(stages: Vec<Stage>, branch: F) -> Result<Vec<T>>
where
    F: Fn(Stage) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<(String, Result<T>)>(stages.len().max(1));
    let mut branches = JoinSet::new();

    let mut names_by_task = HashMap::new();

    for stage in stages {
        let name = stage.name.clone();
        let fut = branch(stage);
        let tx = tx.clone();
        let task_name = name.clone();
        let handle = branches.spawn(async move {
            let res = fut.await;
            // Capacity equals the branch count, so this never waits.
            let _ = tx.send((task_name, res)).await;
        });
        names_by_task.insert(handle.id(), name);
    }
    drop(tx);

    let mut panicked = Vec::new();
    while let Some(joined) = branches.join_next().await {
        if let Err(e) = joined {
            let stage = names_by_task
                .remove(&e.id())
                .unwrap_or_else(|| "<unknown>".to_string());
            error!(%stage, error = %e, "branch task aborted");
            panicked.push((stage, e));
        }
    }

    let mut successes = Vec::new();
    let mut first_error: Option<(String, CloudrefError)> = None;
    let mut failed = 0usize;

    while let Some((name, res)) = rx.recv().await {
        match res {
            Ok(value) => successes.push(value),
            Err(e) => {
                failed += 1;
                error!(stage = %name, error = %e, "branch failed");
                if first_error.is_none() {
                    first_error = Some((name, e));
                }
            }
        }
    }

    failed += panicked.len();
    if first_error.is_none() {
        if let Some((stage, e)) = panicked.into_iter().next() {
            first_error = Some((
                stage,
                CloudrefError::Other(anyhow::anyhow!("branch task aborted: {e}")),
            ));
        }
    }

    match first_error {
        Some((stage, source)) => Err(CloudrefError::BranchFailed {
            stage,
            failed,
            source: Box::new(source),
        }),
        None => {
            info!(branches = successes.len(), "wave completed");
            Ok(successes)
        }
    }
}
