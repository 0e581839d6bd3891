use colored::*;
use timelock_protocol::execution::{AttemptOutcome, ExecutionRequest, ExecutionStatus};

fn paint_status(status: ExecutionStatus) -> ColoredString {
    let label = status.as_str().to_uppercase();
    match status {
        ExecutionStatus::Queued => label.cyan(),
        ExecutionStatus::Executing => label.yellow(),
        ExecutionStatus::Executed => label.green(),
        ExecutionStatus::Failed => label.red(),
        ExecutionStatus::Cancelled => label.dimmed(),
    }
}

pub fn print_request(request: &ExecutionRequest) {
    println!(
        "{} {} [{}]",
        "Proposal".bold(),
        request.proposal_id.bold(),
        paint_status(request.status)
    );
    println!("  Request: {}", request.id);
    println!("  ETA: {}", request.eta.to_rfc3339());
    println!("  Attempts: {}", request.attempts);
    println!("  Calls: {}", request.payload.len());
    if let Some(last) = request.last_attempt_at {
        println!("  Last attempt: {}", last.to_rfc3339());
    }
    if let Some(error) = &request.error {
        println!("  Last error: {}", error.red());
    }
    if let Some(receipt) = &request.receipt {
        match receipt.block_number {
            Some(block) => println!("  Tx: {} (block {})", receipt.tx_hash, block),
            None => println!("  Tx: {}", receipt.tx_hash),
        }
    }
    if let Some(actor) = &request.cancelled_by {
        println!("  Cancelled by: {}", actor);
    }
}

pub fn print_enqueued(request: &ExecutionRequest) {
    println!(
        "{} {}",
        "✔ Execution queued:".green().bold(),
        request.proposal_id.bold()
    );
    println!("  Request: {}", request.id);
    println!("  ETA: {}", request.eta.to_rfc3339());
}

pub fn print_outcome(outcome: &AttemptOutcome) {
    let request = outcome.request();
    match outcome {
        AttemptOutcome::Executed(_) => println!(
            "{} {}",
            "✔ Executed:".green().bold(),
            request.proposal_id.bold()
        ),
        AttemptOutcome::Retrying(_) => println!(
            "{} {} (attempt {}, will retry)",
            "✖ Attempt failed:".yellow().bold(),
            request.proposal_id.bold(),
            request.attempts
        ),
        AttemptOutcome::GaveUp(_) => println!(
            "{} {} after {} attempts",
            "✖ Gave up:".red().bold(),
            request.proposal_id.bold(),
            request.attempts
        ),
    }
    print_request(request);
}

pub fn print_cancelled(request: &ExecutionRequest) {
    println!(
        "{} {}",
        "✔ Execution cancelled:".green().bold(),
        request.proposal_id.bold()
    );
    if let Some(actor) = &request.cancelled_by {
        println!("  By: {}", actor);
    }
}

pub fn print_reset(request: &ExecutionRequest) {
    println!(
        "{} {}",
        "✔ Execution re-queued:".green().bold(),
        request.proposal_id.bold()
    );
    println!("  ETA: {}", request.eta.to_rfc3339());
}

pub fn print_list(requests: &[ExecutionRequest]) {
    if requests.is_empty() {
        println!("{}", "No executions found.".dimmed());
        return;
    }
    for request in requests {
        println!(
            "{:<12} {:<36} {}  attempts={}",
            paint_status(request.status),
            request.proposal_id,
            request.eta.to_rfc3339(),
            request.attempts
        );
    }
}
