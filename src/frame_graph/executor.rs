use parking_lot::{Condvar, Mutex, MutexGuard};

use super::planner::{Planner, StealResult, WakeupState};
use super::topology::{Runnable, StageIndex, Topology};
use crate::tracer::{self, Tracer};
use crate::Scene;

/// Runs every stage of `topology` once.
///
/// `concurrency` is the number of worker threads in `thread_pool`.
/// The calling thread also executes stages,
/// so it is valid to pass no pool and a concurrency of 0.
pub(crate) fn execute(
    scene: &Scene,
    topology: &Topology,
    thread_pool: Option<&rayon::ThreadPool>,
    concurrency: usize,
) {
    let planner = Mutex::new(topology.initial_planner().clone());
    let condvar = Condvar::new();
    let context = Context { scene, topology, planner: &planner, condvar: &condvar };

    match thread_pool {
        Some(pool) => {
            let deadlock_counter = DeadlockCounter::new(concurrency + 1);
            pool.in_place_scope(|scope| {
                for worker_id in 0..concurrency {
                    let deadlock_counter = &deadlock_counter;
                    scope.spawn(move |_| {
                        worker(tracer::Thread::Worker(worker_id), context, deadlock_counter)
                    });
                }

                worker(tracer::Thread::Main, context, &deadlock_counter);
            });
        }
        None => worker(tracer::Thread::Main, context, &DeadlockCounter::new(1)),
    }

    #[cfg(debug_assertions)]
    {
        let planner = planner.into_inner();
        for (index, state) in planner.wakeup_state.iter().enumerate() {
            if !matches!(state, WakeupState::Completed) {
                panic!("Stage {} state is {:?} instead of complete", topology.stage(StageIndex(index)), state)
            }
        }
    }
}

fn worker(thread: tracer::Thread, context: Context<'_>, deadlock_counter: &DeadlockCounter) {
    let tracer = context.scene.tracer();
    let mut planner_guard = context.planner.lock();

    loop {
        match planner_guard.steal(tracer, thread) {
            StealResult::FrameComplete => return,
            StealResult::Pending => {
                deadlock_counter.start_wait();
                context.condvar.wait(&mut planner_guard);
            }
            StealResult::Ready(index) => {
                MutexGuard::unlocked(&mut planner_guard, || run_stage(tracer, thread, context, index));

                planner_guard.complete(index, context.topology, context.condvar, deadlock_counter);
            }
        }
    }
}

fn run_stage(tracer: &dyn Tracer, thread: tracer::Thread, context: Context<'_>, index: StageIndex) {
    let stage = context.topology.stage(index);
    tracer.start_stage(thread, stage);

    match context.topology.runnable(index) {
        Runnable::Noop => {}
        Runnable::ComponentUpdate(ty) => {
            if let Some(data) = context.scene.registry().find_component_type_data_dyn(*ty) {
                data.run_updates(context.scene);
            }
        }
        Runnable::Custom(runner) => (**runner)(context.scene),
    }

    tracer.end_stage(thread, stage);
}

#[cfg(debug_assertions)]
mod deadlock_counter {
    use std::sync::atomic::{self, AtomicUsize};

    pub(crate) struct DeadlockCounter(AtomicUsize);

    impl DeadlockCounter {
        pub(crate) fn new(concurrency: usize) -> Self { Self(AtomicUsize::new(concurrency)) }

        pub(crate) fn start_wait(&self) {
            let cnt = self.0.fetch_sub(1, atomic::Ordering::SeqCst);
            if cnt == 1 {
                panic!("Deadlock detected, all workers and main are waiting for stages");
            }
        }

        pub(crate) fn end_wait(&self, count: usize) {
            self.0.fetch_add(count, atomic::Ordering::SeqCst);
        }
    }
}

#[cfg(not(debug_assertions))]
mod deadlock_counter {
    pub(crate) struct DeadlockCounter;

    impl DeadlockCounter {
        pub(crate) fn new(_concurrency: usize) -> Self { Self }
        pub(crate) fn start_wait(&self) {}
        pub(crate) fn end_wait(&self, _count: usize) {}
    }
}

pub(crate) use deadlock_counter::DeadlockCounter;

#[derive(Clone, Copy)]
struct Context<'t> {
    scene:    &'t Scene,
    topology: &'t Topology,
    planner:  &'t Mutex<Planner>,
    condvar:  &'t Condvar,
}
