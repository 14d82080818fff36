use std::collections::BTreeSet;
use std::num::NonZeroUsize;

use parking_lot::Condvar;

use super::executor::DeadlockCounter;
use super::topology::{StageIndex, Topology};
use crate::tracer::{self, Tracer};

/// The scheduling state of a stage within one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WakeupState {
    /// Some dependencies have not completed yet.
    Blocked { count: NonZeroUsize },
    /// All dependencies have completed, the stage is in the runnable pool.
    Pending,
    /// A worker has taken the stage.
    Started,
    /// The stage has completed.
    Completed,
}

/// Stores the frame-local state for schedule availability.
#[derive(Debug, Clone)]
pub(crate) struct Planner {
    /// The wakeup state of each stage, indexed by [`StageIndex`].
    pub(crate) wakeup_state:     Vec<WakeupState>,
    /// The stages whose dependencies have all completed.
    pub(crate) runnable:         BTreeSet<StageIndex>,
    /// Number of stages that have not completed.
    pub(crate) remaining_stages: usize,
}

impl Planner {
    /// Steal a stage from the runnable pool if any is available.
    pub(crate) fn steal(&mut self, tracer: &dyn Tracer, thread: tracer::Thread) -> StealResult {
        if self.remaining_stages == 0 {
            tracer.steal_return_complete(thread);
            return StealResult::FrameComplete;
        }

        let index = match self.runnable.pop_first() {
            Some(index) => index,
            None => {
                tracer.steal_return_pending(thread);
                return StealResult::Pending;
            }
        };

        let state = self.wakeup_state.get_mut(index.0).expect("invalid stage index");
        match state {
            WakeupState::Pending => *state = WakeupState::Started,
            _ => panic!("stage {index:?} is in runnable queue but state is {state:?} instead of Pending"),
        }

        StealResult::Ready(index)
    }

    /// Mark a stage as completed and wake up workers waiting for its dependents.
    pub(crate) fn complete(
        &mut self,
        index: StageIndex,
        topology: &Topology,
        condvar: &Condvar,
        deadlock_counter: &DeadlockCounter,
    ) {
        self.mark_completed(index, topology);

        let wakeups = condvar.notify_all();
        deadlock_counter.end_wait(wakeups);
    }

    /// Marks a stage popped directly from the runnable pool as completed.
    pub(crate) fn complete_sequential(&mut self, index: StageIndex, topology: &Topology) {
        let state = self.wakeup_state.get_mut(index.0).expect("invalid stage index");
        assert_eq!(*state, WakeupState::Pending, "stage {index:?} should be pending");
        *state = WakeupState::Started;
        self.mark_completed(index, topology);
    }

    fn mark_completed(&mut self, index: StageIndex, topology: &Topology) {
        {
            let state = self.wakeup_state.get_mut(index.0).expect("invalid stage index");
            match state {
                WakeupState::Started => *state = WakeupState::Completed,
                _ => panic!("cannot mark a {state:?} stage as completed"),
            }
        }

        for &dependent in topology.dependents_of(index) {
            self.remove_one_block(dependent);
        }

        self.remaining_stages -= 1;
    }

    /// Removes one blocker count from a stage wakeup state.
    fn remove_one_block(&mut self, index: StageIndex) {
        let state = self.wakeup_state.get_mut(index.0).expect("invalid stage index");
        match state {
            WakeupState::Blocked { count } if count.get() > 1 => {
                *count = NonZeroUsize::new(count.get() - 1).expect("count - 1 > 1 - 1 = 0")
            }
            WakeupState::Blocked { .. } => {
                *state = WakeupState::Pending;
                let new = self.runnable.insert(index);
                assert!(new, "Blocked stage {index:?} is already in runnable pool");
            }
            state => panic!("Stage {index:?} is in state {state:?} which should not have blockers"),
        }
    }
}

#[derive(Debug)]
pub(crate) enum StealResult {
    Ready(StageIndex),
    Pending,
    FrameComplete,
}
