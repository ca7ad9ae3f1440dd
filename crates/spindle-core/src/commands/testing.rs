//! In-memory backend for driving replies by hand in tests

use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;
use tokio::sync::oneshot;

use super::{Backend, BackendCommand, Reply};

/// Records every invoked command and answers only when told to
#[derive(Default)]
pub struct ScriptedBackend {
    calls: RefCell<Vec<(BackendCommand, Option<oneshot::Sender<Reply>>)>>,
}

impl ScriptedBackend {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// All commands invoked so far, in order
    pub fn commands(&self) -> Vec<BackendCommand> {
        self.calls.borrow().iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn count(&self, pred: impl Fn(&BackendCommand) -> bool) -> usize {
        self.calls.borrow().iter().filter(|(c, _)| pred(c)).count()
    }

    /// Commands still waiting for an answer
    pub fn outstanding(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|(_, tx)| tx.is_some())
            .count()
    }

    /// Answer the oldest unanswered command matching `pred`
    ///
    /// Returns false when nothing matched.
    pub fn reply(&self, pred: impl Fn(&BackendCommand) -> bool, value: Value) -> bool {
        self.answer(pred, Ok(value))
    }

    /// Answer the most recent unanswered command matching `pred`
    pub fn reply_newest(&self, pred: impl Fn(&BackendCommand) -> bool, value: Value) -> bool {
        let mut calls = self.calls.borrow_mut();
        let slot = calls
            .iter_mut()
            .rev()
            .find(|(command, tx)| tx.is_some() && pred(command));
        Self::send(slot, Ok(value))
    }

    /// Reject the oldest unanswered command matching `pred`
    pub fn fail(&self, pred: impl Fn(&BackendCommand) -> bool, message: &str) -> bool {
        self.answer(pred, Err(message.to_string()))
    }

    fn answer(&self, pred: impl Fn(&BackendCommand) -> bool, reply: Reply) -> bool {
        let mut calls = self.calls.borrow_mut();
        let slot = calls
            .iter_mut()
            .find(|(command, tx)| tx.is_some() && pred(command));
        Self::send(slot, reply)
    }

    fn send(
        slot: Option<&mut (BackendCommand, Option<oneshot::Sender<Reply>>)>,
        reply: Reply,
    ) -> bool {
        match slot.and_then(|(_, tx)| tx.take()) {
            Some(tx) => {
                let _ = tx.send(reply);
                true
            }
            None => false,
        }
    }
}

impl Backend for ScriptedBackend {
    fn invoke(&self, command: BackendCommand) -> oneshot::Receiver<Reply> {
        let (tx, rx) = oneshot::channel();
        self.calls.borrow_mut().push((command, Some(tx)));
        rx
    }
}
