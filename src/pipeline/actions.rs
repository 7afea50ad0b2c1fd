//! Action Items extraction from a generated summary.
//!
//! The summary prompt demands a literal line contract inside the
//! `## 4. Action Items` section:
//!
//! ```text
//! - <description> • Assigned To: <name> • Deadline: <date-or-None>
//! ```
//!
//! Lines that break the contract degrade to a bare-description task rather
//! than being dropped; the degradation is logged so contract drift is
//! visible in traces.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::meetings::model::{Task, UNASSIGNED};

/// Captures the Action Items section body up to the next section header.
static ACTION_SECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)##\s*4\.?\s*Action Items[^\n]*\n(.*?)(?:\n##|\z)")
        .expect("valid section regex")
});

/// Strict per-line contract.
static ACTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)-\s*(.*?)\s*•\s*Assigned To:\s*(.*?)\s*•\s*Deadline:\s*(.*)")
        .expect("valid line regex")
});

/// Leading bullet marker for the fallback path.
static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*-\s*").expect("valid bullet regex"));

/// Parse the Action Items section of a summary into pending tasks, in
/// document order. Missing section or no parseable lines yields an empty
/// list, never an error.
pub fn parse_action_items(summary: &str) -> Vec<Task> {
    let Some(section) = ACTION_SECTION
        .captures(summary)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
    else {
        debug!("Summary has no Action Items section");
        return Vec::new();
    };

    let mut tasks = Vec::new();
    for line in section.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(caps) = ACTION_LINE.captures(trimmed) {
            let description = caps[1].trim().to_string();
            if description.is_empty() {
                continue;
            }
            let assignee = caps[2].trim();
            let deadline = caps[3].trim();

            let mut task = Task::new(description);
            if !assignee.is_empty() && assignee != UNASSIGNED {
                task = task.with_assignee(assignee);
            }
            if !deadline.is_empty() && deadline != "None" {
                task = task.with_due_date(deadline);
            }
            tasks.push(task);
        } else {
            // Contract miss: keep the line as a bare description unless it
            // is a parenthetical instruction echoed back by the model.
            let bare = BULLET.replace(trimmed, "").trim().to_string();
            if bare.is_empty() || bare.starts_with('(') {
                continue;
            }
            debug!(line = %trimmed, "Action item line missed the strict contract");
            tasks.push(Task::new(bare));
        }
    }

    tasks
}
