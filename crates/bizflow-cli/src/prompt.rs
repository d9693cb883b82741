//! Terminal reviewer for `bizflow run`.
//!
//! Gate requests are printed to stderr and answered on stdin, so stdout stays
//! free for the final result.

use bizflow_core::{AgentId, AgentOutput, ApprovalResponse, RevisionType, WorkflowEvent};
use std::collections::BTreeMap;

/// Render a gate request, or `None` for events that need no answer.
pub fn format_gate_prompt(event: &WorkflowEvent) -> Option<String> {
    match event {
        WorkflowEvent::PlanApprovalRequest {
            task_description,
            sequence,
            rationale,
            confidence,
            complexity,
            fallback_reason,
            ..
        } => {
            let mut prompt = String::new();
            prompt.push_str("\n\x1b[1;37m╔══ PLAN APPROVAL ══╗\x1b[0m\n");
            prompt.push_str(&format!("  Task:       {task_description}\n"));
            prompt.push_str(&format!(
                "  Confidence: {:.0}%   Complexity: {complexity:?}\n",
                confidence * 100.0
            ));
            if let Some(reason) = fallback_reason {
                prompt.push_str(&format!("  \x1b[33mFallback plan:\x1b[0m {reason}\n"));
            }
            for (i, agent) in sequence.iter().enumerate() {
                let why = rationale.get(agent).map(String::as_str).unwrap_or("");
                prompt.push_str(&format!("  {}. {:<12} {why}\n", i + 1, agent.as_str()));
            }
            prompt.push_str("\x1b[1;37m╚═══════════════════╝\x1b[0m\n");
            prompt.push_str("  [y | n [feedback] | replan [feedback] | plan a,b,c [feedback]]: ");
            Some(prompt)
        }
        WorkflowEvent::FinalResultsApprovalRequest {
            iteration, results, ..
        } => {
            let mut prompt = String::new();
            prompt.push_str("\n\x1b[1;37m╔══ RESULT APPROVAL ══╗\x1b[0m\n");
            prompt.push_str(&format!("  Iteration: {iteration}\n"));
            prompt.push_str(&format_results(results));
            prompt.push_str("\x1b[1;37m╚═════════════════════╝\x1b[0m\n");
            prompt.push_str("  [y | n [feedback] | agents a,b [feedback] | replan [feedback]]: ");
            Some(prompt)
        }
        _ => None,
    }
}

fn format_results(results: &BTreeMap<AgentId, AgentOutput>) -> String {
    results
        .iter()
        .map(|(agent, out)| format!("  {:<12} {}\n", agent.as_str(), out.summary))
        .collect()
}

/// One-line rendering of a non-gate event.
pub fn format_status_line(event: &WorkflowEvent) -> Option<String> {
    match event {
        WorkflowEvent::WorkflowProgressUpdate {
            iteration,
            step,
            total_steps,
            agent,
        } => Some(format!(
            "  [{iteration}] step {}/{total_steps}: {agent}",
            step + 1
        )),
        WorkflowEvent::WorkflowError {
            stage,
            agent,
            message,
            ..
        } => Some(match agent {
            Some(a) => format!("\x1b[1;31m  ✗ {stage} failed at {a}: {message}\x1b[0m"),
            None => format!("\x1b[1;31m  ✗ {stage} failed: {message}\x1b[0m"),
        }),
        WorkflowEvent::WorkflowCancelled { reason } => Some(format!("  cancelled: {reason}")),
        WorkflowEvent::WorkflowCompleted { iterations, .. } => Some(format!(
            "\x1b[32m  ✓ completed after {iterations} iteration(s)\x1b[0m"
        )),
        _ => None,
    }
}

/// Parse a reviewer's answer into a response for `request_id`.
///
/// `y`/`yes` approves. `n [feedback]` rejects, as does any other text, which
/// is then kept as feedback. `agents a,b [feedback]`, `replan [feedback]` and
/// `plan a,b,c [feedback]` request the matching revision. Agent names are
/// passed through unchecked; the gate validates them.
pub fn parse_reply(input: &str, request_id: &str) -> ApprovalResponse {
    let trimmed = input.trim();
    let (word, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (trimmed, ""),
    };

    let mut response = ApprovalResponse::reject(request_id, None);
    match word.to_lowercase().as_str() {
        "y" | "yes" => return ApprovalResponse::approve(request_id),
        "n" | "no" | "" => response.feedback = non_empty(rest),
        "replan" => {
            response.revision_type = Some(RevisionType::FullReplan);
            response.feedback = non_empty(rest);
        }
        "agents" => {
            let (names, feedback) = split_list(rest);
            response.revision_type = Some(RevisionType::SpecificAgents);
            response.target_agents = Some(names);
            response.feedback = feedback;
        }
        "plan" => {
            let (names, feedback) = split_list(rest);
            response.modified_sequence = Some(names);
            response.feedback = feedback;
        }
        _ => response.feedback = Some(trimmed.to_string()),
    }
    response
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// Split `a,b,c rest of line` into names and optional feedback.
fn split_list(s: &str) -> (Vec<String>, Option<String>) {
    let (list, feedback) = match s.split_once(char::is_whitespace) {
        Some((l, f)) => (l, non_empty(f.trim())),
        None => (s, None),
    };
    let names = list
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect();
    (names, feedback)
}

/// Reviewer name for terminal answers.
pub fn reviewer_name() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "cli-user".to_string())
}
