use std::collections::VecDeque;

/// One executed (or rejected) action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRecord {
    pub kind: String,
    /// Requested coordinate, logical space.
    pub logical: Option<(i64, i64)>,
    /// Coordinate actually sent, real space.
    pub real: Option<(i64, i64)>,
    /// History line shown to the model.
    pub summary: String,
    pub outcome: String,
    pub success: bool,
}

/// Bounded window of the most recent action records.
#[derive(Debug)]
pub struct RecentActions {
    window: usize,
    records: VecDeque<ActionRecord>,
    total: usize,
}

impl RecentActions {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            records: VecDeque::with_capacity(window),
            total: 0,
        }
    }

    pub fn push(&mut self, record: ActionRecord) {
        self.total += 1;
        if self.window == 0 {
            return;
        }
        if self.records.len() == self.window {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Actions recorded since the task started, including evicted ones.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActionRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Hint appended once the model starts repeating itself.
pub fn recovery_hint(stagnation: u32) -> Option<&'static str> {
    match stagnation {
        0 => None,
        1 => Some(
            "NOTE: You appear to be repeating similar actions without progress. \
Try a different approach such as:\n\
- Navigate directly to a URL with the browser tool, or click the address bar and type it\n\
- If trying to search, make sure to type in the search box and press Enter\n\
- Look for alternative UI elements to interact with",
        ),
        _ => Some(
            "IMPORTANT: You're still stuck. Try a completely different approach:\n\
- Navigate straight to the target URL with the browser tool\n\
- Use key presses like 'Tab' to move between elements and 'Return' to activate them\n\
- Check if you can use browser shortcuts",
        ),
    }
}

/// Per-turn context text sent alongside the screenshot.
pub fn build_context(task: &str, turn: u32, recent: &RecentActions, stagnation: u32) -> String {
    let mut message = format!(
        "Here is the current state of the browser. Your task is to: {}. This is turn {}.",
        task, turn
    );

    if !recent.is_empty() {
        message.push_str("\n\nSo far, you have performed these actions:");
        let first_index = recent.total() - recent.len() + 1;
        for (i, record) in recent.iter().enumerate() {
            message.push_str(&format!("\n{}. {}", first_index + i, record.summary));
            if !record.success {
                message.push_str(&format!(" (failed: {})", record.outcome));
            }
        }
    }

    match recovery_hint(stagnation) {
        Some(hint) => {
            message.push_str("\n\n");
            message.push_str(hint);
            message.push_str("\n\nWhat would you like to do next?");
        }
        None => message.push_str("\n\nWhat should I do next?"),
    }

    message
}
