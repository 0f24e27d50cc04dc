//! The velocity-command seam.
//!
//! Controllers only ever talk to [`CommandSink`], so a wheel driver, the
//! simulated base or a bus mirror can sit behind it without touching control
//! logic.

use std::sync::{Arc, Mutex};

use strider_types::VelocityCommand;

/// Anything that accepts `(angular, linear)` velocity commands.
pub trait CommandSink: Send + Sync {
    /// Deliver one command.  Called once per control tick.
    fn send(&self, command: VelocityCommand);
}

impl<T: CommandSink + ?Sized> CommandSink for Arc<T> {
    fn send(&self, command: VelocityCommand) {
        (**self).send(command)
    }
}

/// Sink that only records what it was sent.
#[derive(Debug, Default)]
pub struct RecordingSink {
    commands: Mutex<Vec<VelocityCommand>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<VelocityCommand> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<VelocityCommand> {
        self.commands.lock().ok().and_then(|c| c.last().copied())
    }
}

impl CommandSink for RecordingSink {
    fn send(&self, command: VelocityCommand) {
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(command);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_keeps_order() {
        let sink = Arc::new(RecordingSink::new());
        let dyn_sink: Arc<dyn CommandSink> = sink.clone();
        dyn_sink.send(VelocityCommand::new(0.1, 0.2));
        dyn_sink.send(VelocityCommand::stop());

        let sent = sink.commands();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], VelocityCommand::new(0.1, 0.2));
        assert!(sink.last().unwrap().is_stop());
    }
}
