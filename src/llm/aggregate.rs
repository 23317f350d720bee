//! Reassembles streamed tool-call fragments.

use std::collections::BTreeMap;

use super::{ToolCall, ToolCallFragment};

#[derive(Debug, Default)]
struct Slot {
    id: String,
    name: String,
    arguments: String,
}

/// Folds [`ToolCallFragment`]s into complete tool calls, keyed by slot index.
///
/// Names and arguments are concatenated in arrival order. A non-empty id
/// overwrites the previous one.
#[derive(Debug, Default)]
pub struct ToolCallAggregator {
    slots: BTreeMap<usize, Slot>,
}

impl ToolCallAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, fragment: ToolCallFragment) {
        let slot = self.slots.entry(fragment.index).or_default();
        if let Some(id) = fragment.id.filter(|id| !id.is_empty()) {
            slot.id = id;
        }
        if let Some(name) = fragment.name {
            slot.name.push_str(&name);
        }
        if let Some(arguments) = fragment.arguments {
            slot.arguments.push_str(&arguments);
        }
    }

    /// Complete calls in slot order; slots without an id or name are dropped.
    pub fn finish(self) -> Vec<ToolCall> {
        self.slots
            .into_values()
            .filter(|slot| !slot.id.is_empty() && !slot.name.is_empty())
            .map(|slot| ToolCall::function(slot.id, slot.name, slot.arguments))
            .collect()
    }
}
