//! Repetition detection: batch signatures, the stagnation counter and the
//! click streak that drives jitter.

use browserpilot_core::ActionRequest;

use crate::actions::{snap, BrowserAction};

/// Deterministic signature of one batch. Requests that do not parse are
/// represented by their raw action name.
pub fn batch_signature(requests: &[ActionRequest], grid: u32) -> String {
    if requests.is_empty() {
        return "none".to_string();
    }
    requests
        .iter()
        .map(|req| match BrowserAction::parse(req) {
            Ok(action) => action.signature(grid),
            Err(_) => req.action_name().to_string(),
        })
        .collect::<Vec<_>>()
        .join("|")
}

#[derive(Debug, Default)]
pub struct StagnationTracker {
    last_signature: Option<String>,
    counter: u32,
}

impl StagnationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record this turn's signature and return the updated counter.
    ///
    /// The first batch of a task opens a run and counts as 1, so `n`
    /// identical batches from the start of a task leave the counter at `n`.
    /// A signature that differs from the previous one resets it to 0.
    pub fn observe(&mut self, signature: &str) -> u32 {
        match self.last_signature.as_deref() {
            Some(last) if last == signature => self.counter = self.counter.saturating_add(1),
            Some(_) => self.counter = 0,
            None => self.counter = 1,
        }
        self.last_signature = Some(signature.to_string());
        self.counter
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }
}

/// Deterministic perturbation for the `n`th consecutive repeat of a click.
pub fn jitter_offset(n: u32) -> (i64, i64) {
    let n = n as i64;
    ((n * 5) % 15 - 7, (n * 3) % 10 - 5)
}

/// Grid cell clicked on the most recent turns, and for how many consecutive
/// turns.
#[derive(Debug, Default)]
pub struct ClickStreak {
    cell: Option<(i64, i64)>,
    turns: u32,
}

impl ClickStreak {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cell(x: i64, y: i64, grid: u32) -> (i64, i64) {
        (snap(x, grid), snap(y, grid))
    }

    /// Consecutive previous turns that clicked `cell`.
    pub fn streak_for(&self, cell: (i64, i64)) -> u32 {
        if self.cell == Some(cell) {
            self.turns
        } else {
            0
        }
    }

    /// Close a turn. `last_click` is the cell of the turn's last click, if
    /// it clicked at all.
    pub fn end_turn(&mut self, last_click: Option<(i64, i64)>) {
        match last_click {
            Some(cell) if self.cell == Some(cell) => self.turns += 1,
            Some(cell) => {
                self.cell = Some(cell);
                self.turns = 1;
            }
            None => {
                self.cell = None;
                self.turns = 0;
            }
        }
    }
}
