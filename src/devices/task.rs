// MIT License - Copyright (c) 2026 envy-lan-bridge contributors
// Envy panel bridge

use tracing::debug;

use crate::config::TaskConfig;
use crate::devices::Context;
use crate::event::DeviceEvent;
use crate::protocol::Command;

/// A momentary panel task. It never stays on.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: u32,
    firing: bool,
}

impl Task {
    pub fn new(config: &TaskConfig) -> Self {
        Self {
            id: config.number,
            firing: false,
        }
    }

    /// Always off.
    pub fn is_on(&self) -> bool {
        false
    }

    /// Fire the task and immediately report it back off. Returns whether a
    /// command was sent.
    pub fn activate(&mut self, ctx: &Context<'_>) -> bool {
        if self.firing {
            return false;
        }
        self.firing = true;
        debug!(task = self.id, "activate");
        ctx.commands.send(Command::ActivateTask { task: self.id });
        ctx.notify(DeviceEvent::TaskReset { id: self.id });
        self.firing = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::harness::Harness;

    #[test]
    fn test_activate_then_reset() {
        let mut h = Harness::new();
        let mut task = Task::new(&TaskConfig {
            number: 3,
            name: String::new(),
        });

        assert!(task.activate(&h.ctx()));
        assert_eq!(h.commands(), vec![Command::ActivateTask { task: 3 }]);
        assert_eq!(h.events(), vec![DeviceEvent::TaskReset { id: 3 }]);
        assert!(!task.is_on());

        // Can fire again right away
        assert!(task.activate(&h.ctx()));
        assert_eq!(h.commands().len(), 1);
    }
}
