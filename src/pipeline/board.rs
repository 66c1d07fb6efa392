use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Participants of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Worker {
    Input,
    BigDetect,
    SmallDetect,
    Synchronizer,
    Render,
}

impl Worker {
    pub const ALL: [Worker; 5] = [
        Worker::Input,
        Worker::BigDetect,
        Worker::SmallDetect,
        Worker::Synchronizer,
        Worker::Render,
    ];
    /// Thread name of the worker
    pub fn name(&self) -> &'static str {
        match self {
            Worker::Input => "input",
            Worker::BigDetect => "big-detect",
            Worker::SmallDetect => "small-detect",
            Worker::Synchronizer => "synchronizer",
            Worker::Render => "render",
        }
    }
}

impl fmt::Display for Worker {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

struct BoardState {
    done: HashMap<Worker, bool>,
    forced: bool,
}

impl BoardState {
    fn pending(&self) -> Vec<Worker> {
        let mut workers: Vec<Worker> = self
            .done
            .iter()
            .filter(|(_, done)| !**done)
            .map(|(worker, _)| *worker)
            .collect();
        workers.sort();
        workers
    }
}

/// Completion flags shared by every worker of a run, plus the force-stop marker
/// raised by the watchdog.
#[derive(Clone)]
pub struct CompletionBoard {
    state: Arc<Mutex<BoardState>>,
}

impl Default for CompletionBoard {
    fn default() -> Self {
        CompletionBoard::new()
    }
}

impl CompletionBoard {
    pub fn new() -> Self {
        let done = Worker::ALL.iter().map(|worker| (*worker, false)).collect();
        CompletionBoard {
            state: Arc::new(Mutex::new(BoardState { done, forced: false })),
        }
    }
    pub fn mark_done(&self, worker: Worker) {
        self.state.lock().done.insert(worker, true);
    }
    pub fn is_done(&self, worker: Worker) -> bool {
        self.state.lock().done.get(&worker).copied().unwrap_or(false)
    }
    pub fn all_done(&self) -> bool {
        self.state.lock().done.values().all(|done| *done)
    }
    pub fn unfinished(&self) -> Vec<Worker> {
        self.state.lock().pending()
    }
    /// Raises the force-stop marker and returns the workers that had not finished
    pub fn force_stop(&self) -> Vec<Worker> {
        let mut state = self.state.lock();
        state.forced = true;
        state.pending()
    }
    pub fn is_forced(&self) -> bool {
        self.state.lock().forced
    }
    /// Marks `worker` done when dropped, so a panicking worker still releases
    /// everything downstream of it
    pub fn guard(&self, worker: Worker) -> DoneGuard {
        DoneGuard {
            board: self.clone(),
            worker,
        }
    }
}

pub struct DoneGuard {
    board: CompletionBoard,
    worker: Worker,
}

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.board.mark_done(self.worker);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let board = CompletionBoard::new();
        assert!(!board.all_done());
        board.mark_done(Worker::Input);
        assert!(board.is_done(Worker::Input));
        assert!(!board.is_done(Worker::Render));
        assert_eq!(board.unfinished().len(), 4);
        for worker in Worker::ALL {
            board.mark_done(worker);
        }
        assert!(board.all_done());
    }

    #[test]
    fn test_force_stop() {
        let board = CompletionBoard::new();
        board.mark_done(Worker::Input);
        board.mark_done(Worker::BigDetect);
        let shared = board.clone();
        assert_eq!(shared.force_stop(), vec![Worker::SmallDetect, Worker::Synchronizer, Worker::Render]);
        assert!(board.is_forced());
    }

    #[test]
    fn test_guard_marks_on_panic() {
        let board = CompletionBoard::new();
        let shared = board.clone();
        let result = std::thread::spawn(move || {
            let _guard = shared.guard(Worker::SmallDetect);
            panic!("detector crashed");
        })
        .join();
        assert!(result.is_err());
        assert!(board.is_done(Worker::SmallDetect));
    }
}
