#[cfg(test)]
#[path = "script_test.rs"]
mod tests;

use super::Mode;

/// Source of the scripted workflow content: the opener shown when a fresh
/// session hydrates empty, and the ordered production steps the guided mode
/// walks through.
pub trait Script {
    fn opening_prompt(&self, mode: Mode) -> String;
    fn step_title(&self, index: usize) -> Option<String>;
    fn step_count(&self) -> usize;
}

pub type ScriptBox = Box<dyn Script + Send + Sync>;

const PRODUCER_STEPS: [&str; 7] = [
    "Set your session goal",
    "Rough in the arrangement",
    "Shape the low end",
    "Balance the mix bus",
    "Carve space with EQ",
    "Add depth and movement",
    "Final listen and notes",
];

#[derive(Default)]
pub struct ProducerScript {}

impl Script for ProducerScript {
    fn opening_prompt(&self, mode: Mode) -> String {
        match mode {
            Mode::Guided => {
                return format!(
                    "Welcome back to the studio! I'll walk you through {count} steps, starting with: {first}. Ready when you are.",
                    count = PRODUCER_STEPS.len(),
                    first = PRODUCER_STEPS[0]
                );
            }
            Mode::Assisted => {
                return "Welcome back to the studio! Tell me what you're working on and I'll suggest where to take it.".to_string();
            }
            Mode::Expert => {
                return "Studio's open. Ask me anything about your session.".to_string();
            }
        }
    }

    fn step_title(&self, index: usize) -> Option<String> {
        return PRODUCER_STEPS.get(index).map(|title| return title.to_string());
    }

    fn step_count(&self) -> usize {
        return PRODUCER_STEPS.len();
    }
}
