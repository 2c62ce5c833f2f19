//! Per-unit script environment and thread scheduler.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use tracing::{trace, warn};

use crate::ids::GameTime;
use crate::unit_mesh::Axis;

use super::execution::{execute, CobQuery, CobStatus, CobValueId, PieceCommand};
use super::script::CobScript;
use super::thread::CobThread;

/// Identifies a thread within one environment.
pub type ThreadId = u32;

/// The services a unit provides to its scripts during a scheduling pass.
pub trait CobHost {
    /// Current simulation tick.
    fn game_time(&self) -> GameTime;

    /// Apply a piece command to the unit's mesh or emit its effect.
    fn apply_piece_command(&mut self, command: PieceCommand);

    /// Answer a query. Unknown queries and queries about missing units
    /// answer 0.
    fn query(&mut self, query: CobQuery) -> i32;

    /// Apply a set-query.
    fn set_value(&mut self, id: CobValueId, value: i32);

    /// True while a move is running on the piece axis.
    fn is_piece_moving(&self, piece: usize, axis: Axis) -> bool;

    /// True while a turn or spin-down is running on the piece axis.
    fn is_piece_turning(&self, piece: usize, axis: Axis) -> bool;
}

/// Scheduler queue a thread currently sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    /// Waiting to run.
    Ready,
    /// Waiting for piece motion to finish.
    Blocked,
    /// Waiting for a tick.
    Sleeping(GameTime),
    /// Returned; reaped on the next scheduling pass.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockCondition {
    Move { piece: usize, axis: Axis },
    Turn { piece: usize, axis: Axis },
}

impl BlockCondition {
    fn is_satisfied(self, host: &impl CobHost) -> bool {
        match self {
            Self::Move { piece, axis } => !host.is_piece_moving(piece, axis),
            Self::Turn { piece, axis } => !host.is_piece_turning(piece, axis),
        }
    }
}

/// Script state owned by one unit.
#[derive(Debug, Clone)]
pub struct CobEnvironment {
    script: Arc<CobScript>,
    statics: Vec<i32>,
    threads: BTreeMap<ThreadId, CobThread>,
    ready: VecDeque<ThreadId>,
    blocked: Vec<(ThreadId, BlockCondition)>,
    sleeping: Vec<(ThreadId, GameTime)>,
    finished: Vec<ThreadId>,
    next_thread_id: ThreadId,
}

impl CobEnvironment {
    /// Environment with zeroed statics and no threads.
    #[must_use]
    pub fn new(script: Arc<CobScript>) -> Self {
        let statics = vec![0; script.static_variable_count as usize];
        Self {
            script,
            statics,
            threads: BTreeMap::new(),
            ready: VecDeque::new(),
            blocked: Vec::new(),
            sleeping: Vec::new(),
            finished: Vec::new(),
            next_thread_id: 0,
        }
    }

    /// The script this environment runs.
    #[must_use]
    pub fn script(&self) -> &CobScript {
        &self.script
    }

    /// Static variables.
    #[must_use]
    pub fn statics(&self) -> &[i32] {
        &self.statics
    }

    /// Number of live threads, finished ones included until reaped.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Queue a new thread at the start of `function_name`. Returns `None`
    /// if the script has no such function.
    pub fn create_thread(&mut self, function_name: &str, args: Vec<i32>) -> Option<ThreadId> {
        let function = self.script.find_function(function_name)?;
        Some(self.spawn(function, args, 0))
    }

    fn spawn(&mut self, function: usize, args: Vec<i32>, signal_mask: u32) -> ThreadId {
        let entry = &self.script.functions[function];
        let thread = CobThread::new(&entry.name, function, entry.address as usize, args, signal_mask);
        let id = self.next_thread_id;
        self.next_thread_id = self.next_thread_id.wrapping_add(1);
        trace!(thread = id, function = %entry.name, "script thread created");
        self.threads.insert(id, thread);
        self.ready.push_back(id);
        id
    }

    /// Which queue a thread is in, `None` once reaped or killed.
    #[must_use]
    pub fn thread_status(&self, id: ThreadId) -> Option<ThreadStatus> {
        if !self.threads.contains_key(&id) {
            return None;
        }
        if self.ready.contains(&id) {
            return Some(ThreadStatus::Ready);
        }
        if self.blocked.iter().any(|(t, _)| *t == id) {
            return Some(ThreadStatus::Blocked);
        }
        if let Some((_, wake)) = self.sleeping.iter().find(|(t, _)| *t == id) {
            return Some(ThreadStatus::Sleeping(*wake));
        }
        if self.finished.contains(&id) {
            return Some(ThreadStatus::Finished);
        }
        None
    }

    /// True while the thread exists and has not returned.
    #[must_use]
    pub fn is_thread_running(&self, id: ThreadId) -> bool {
        matches!(
            self.thread_status(id),
            Some(ThreadStatus::Ready | ThreadStatus::Blocked | ThreadStatus::Sleeping(_))
        )
    }

    /// Return value of a finished thread that has not been reaped yet.
    #[must_use]
    pub fn thread_result(&self, id: ThreadId) -> Option<i32> {
        if self.finished.contains(&id) {
            self.threads.get(&id).map(|t| t.return_value)
        } else {
            None
        }
    }

    /// Run `function_name` to completion outside the scheduler and return
    /// its root locals. Returns `None` if the function is missing, blocks,
    /// sleeps or fails.
    pub fn call_synchronous(
        &mut self,
        function_name: &str,
        args: Vec<i32>,
        host: &mut impl CobHost,
    ) -> Option<Vec<i32>> {
        let function = self.script.find_function(function_name)?;
        let entry = &self.script.functions[function];
        let mut thread = CobThread::new(&entry.name, function, entry.address as usize, args, 0);
        let now = host.game_time();
        loop {
            let status = match execute(&mut thread, &self.script, &mut self.statics, now) {
                Ok(status) => status,
                Err(error) => {
                    warn!(function = function_name, %error, "synchronous script call failed");
                    return None;
                }
            };
            match status {
                CobStatus::Finished => return Some(thread.return_locals),
                CobStatus::WaitForMove { .. }
                | CobStatus::WaitForTurn { .. }
                | CobStatus::Sleep { .. } => return None,
                other => {
                    if !self.service(&mut thread, other, host) {
                        return None;
                    }
                }
            }
        }
    }

    /// Service a status that does not suspend the thread. Returns false if
    /// the status suspends it.
    fn service(&mut self, thread: &mut CobThread, status: CobStatus, host: &mut impl CobHost) -> bool {
        match status {
            CobStatus::PieceCommand(command) => host.apply_piece_command(command),
            CobStatus::Query(query) => thread.push(host.query(query)),
            CobStatus::SetValue { id, value } => host.set_value(id, value),
            CobStatus::StartScript { function, args } => {
                self.spawn(function, args, thread.signal_mask);
            }
            CobStatus::Signal(signal) => self.kill_signalled(signal),
            CobStatus::WaitForMove { .. }
            | CobStatus::WaitForTurn { .. }
            | CobStatus::Sleep { .. }
            | CobStatus::Finished => return false,
        }
        true
    }

    /// Kill every thread in the pool whose mask intersects `signal`. The
    /// running thread is not in the pool while it executes.
    fn kill_signalled(&mut self, signal: u32) {
        let doomed: Vec<ThreadId> = self
            .threads
            .iter()
            .filter(|(id, t)| t.signal_mask & signal != 0 && !self.finished.contains(id))
            .map(|(id, _)| *id)
            .collect();
        for id in doomed {
            trace!(thread = id, signal, "script thread killed by signal");
            self.threads.remove(&id);
            self.ready.retain(|t| *t != id);
            self.blocked.retain(|(t, _)| *t != id);
            self.sleeping.retain(|(t, _)| *t != id);
        }
    }

    /// One scheduling pass: reap, wake, then run until every ready thread
    /// has suspended or finished.
    pub fn run_scripts(&mut self, host: &mut impl CobHost) {
        let now = host.game_time();

        for id in std::mem::take(&mut self.finished) {
            self.threads.remove(&id);
        }

        let mut still_blocked = Vec::with_capacity(self.blocked.len());
        for (id, condition) in std::mem::take(&mut self.blocked) {
            if condition.is_satisfied(host) {
                self.ready.push_back(id);
            } else {
                still_blocked.push((id, condition));
            }
        }
        self.blocked = still_blocked;

        let mut still_sleeping = Vec::with_capacity(self.sleeping.len());
        for (id, wake_time) in std::mem::take(&mut self.sleeping) {
            if wake_time <= now {
                self.ready.push_back(id);
            } else {
                still_sleeping.push((id, wake_time));
            }
        }
        self.sleeping = still_sleeping;

        while let Some(id) = self.ready.pop_front() {
            let Some(mut thread) = self.threads.remove(&id) else {
                continue;
            };
            self.run_thread(id, &mut thread, now, host);
            self.threads.insert(id, thread);
        }

        let queued = self.ready.len() + self.blocked.len() + self.sleeping.len() + self.finished.len();
        assert_eq!(
            queued,
            self.threads.len(),
            "script scheduler corrupted: {queued} queued threads but {} allocated",
            self.threads.len()
        );
    }

    fn run_thread(&mut self, id: ThreadId, thread: &mut CobThread, now: GameTime, host: &mut impl CobHost) {
        loop {
            let status = match execute(thread, &self.script, &mut self.statics, now) {
                Ok(status) => status,
                Err(error) => {
                    warn!(thread = id, function = %thread.name, %error, "script thread aborted");
                    self.finished.push(id);
                    return;
                }
            };
            match status {
                CobStatus::WaitForMove { piece, axis } => {
                    let condition = BlockCondition::Move { piece, axis };
                    if !condition.is_satisfied(host) {
                        self.blocked.push((id, condition));
                        return;
                    }
                }
                CobStatus::WaitForTurn { piece, axis } => {
                    let condition = BlockCondition::Turn { piece, axis };
                    if !condition.is_satisfied(host) {
                        self.blocked.push((id, condition));
                        return;
                    }
                }
                CobStatus::Sleep { wake_time } => {
                    self.sleeping.push((id, wake_time));
                    return;
                }
                CobStatus::Finished => {
                    self.finished.push(id);
                    return;
                }
                other => {
                    self.service(thread, other, host);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cob::{CobFunction, CobOpCode, PieceCommandKind};
    use crate::unit_mesh::UnitMesh;

    struct TestHost {
        time: GameTime,
        mesh: UnitMesh,
        values: Vec<(CobValueId, i32)>,
    }

    impl TestHost {
        fn new() -> Self {
            Self {
                time: GameTime(0),
                mesh: UnitMesh::new(&["base".to_string(), "arm".to_string()], None),
                values: Vec::new(),
            }
        }
    }

    impl CobHost for TestHost {
        fn game_time(&self) -> GameTime {
            self.time
        }

        fn apply_piece_command(&mut self, command: PieceCommand) {
            match command.kind {
                PieceCommandKind::Move { axis, position, speed } => {
                    self.mesh.move_piece(command.piece, axis, position, speed);
                }
                PieceCommandKind::Turn { axis, angle, speed } => {
                    self.mesh.turn_piece(command.piece, axis, angle, speed);
                }
                _ => {}
            }
        }

        fn query(&mut self, query: CobQuery) -> i32 {
            match query {
                CobQuery::Random { low, .. } => low,
                CobQuery::Value { id, .. } => id.code() * 100,
            }
        }

        fn set_value(&mut self, id: CobValueId, value: i32) {
            self.values.push((id, value));
        }

        fn is_piece_moving(&self, piece: usize, axis: Axis) -> bool {
            self.mesh.is_moving(piece, axis)
        }

        fn is_piece_turning(&self, piece: usize, axis: Axis) -> bool {
            self.mesh.is_turning(piece, axis)
        }
    }

    fn op(code: CobOpCode) -> u32 {
        code.code()
    }

    fn environment(instructions: Vec<u32>, functions: &[(&str, u32)]) -> CobEnvironment {
        let script = CobScript {
            instructions,
            functions: functions
                .iter()
                .map(|(name, address)| CobFunction {
                    name: (*name).to_string(),
                    address: *address,
                })
                .collect(),
            pieces: vec!["base".to_string(), "arm".to_string()],
            static_variable_count: 2,
        };
        script.validate().expect("test script should be valid");
        CobEnvironment::new(Arc::new(script))
    }

    #[test]
    fn test_sleep_wakes_on_expected_tick() {
        let mut env = environment(
            vec![
                op(CobOpCode::PushConstant), 100,
                op(CobOpCode::Sleep),
                op(CobOpCode::PushConstant), 0,
                op(CobOpCode::Return),
            ],
            &[("Main", 0)],
        );
        let mut host = TestHost::new();
        host.time = GameTime(10);
        let id = env.create_thread("Main", vec![]).unwrap();
        env.run_scripts(&mut host);
        assert_eq!(env.thread_status(id), Some(ThreadStatus::Sleeping(GameTime(13))));

        host.time = GameTime(12);
        env.run_scripts(&mut host);
        assert_eq!(env.thread_status(id), Some(ThreadStatus::Sleeping(GameTime(13))));

        host.time = GameTime(13);
        env.run_scripts(&mut host);
        assert_eq!(env.thread_status(id), Some(ThreadStatus::Finished));

        host.time = GameTime(14);
        env.run_scripts(&mut host);
        assert_eq!(env.thread_status(id), None);
        assert_eq!(env.thread_count(), 0);
    }

    #[test]
    fn test_wait_for_move_resumes_after_motion_completes() {
        // Move arm on Y to 3.0 at 30/s (1 per tick), wait, then set static 0.
        let mut env = environment(
            vec![
                op(CobOpCode::PushConstant), (3 << 16) as u32,
                op(CobOpCode::PushConstant), (30 << 16) as u32,
                op(CobOpCode::Move), 1, 1,
                op(CobOpCode::WaitForMove), 1, 1,
                op(CobOpCode::PushConstant), 1,
                op(CobOpCode::PopStatic), 0,
                op(CobOpCode::PushConstant), 0,
                op(CobOpCode::Return),
            ],
            &[("Main", 0)],
        );
        let mut host = TestHost::new();
        let id = env.create_thread("Main", vec![]).unwrap();

        let mut resumed_at = None;
        for tick in 0..10 {
            host.time = GameTime(tick);
            env.run_scripts(&mut host);
            if resumed_at.is_none() && env.statics()[0] == 1 {
                resumed_at = Some(tick);
            }
            host.mesh.update();
        }
        // Piece reaches its target during the update of tick 2.
        assert_eq!(resumed_at, Some(3));
        assert!(!env.is_thread_running(id));
    }

    #[test]
    fn test_wait_for_move_on_idle_piece_continues() {
        let mut env = environment(
            vec![
                op(CobOpCode::WaitForMove), 0, 0,
                op(CobOpCode::PushConstant), 5,
                op(CobOpCode::PopStatic), 1,
                op(CobOpCode::PushConstant), 0,
                op(CobOpCode::Return),
            ],
            &[("Main", 0)],
        );
        let mut host = TestHost::new();
        env.create_thread("Main", vec![]);
        env.run_scripts(&mut host);
        assert_eq!(env.statics()[1], 5);
    }

    #[test]
    fn test_signal_kills_masked_threads_only() {
        let mut env = environment(
            vec![
                // Waiter: mask 2, sleep forever-ish.
                op(CobOpCode::PushConstant), 2,
                op(CobOpCode::SetSignalMask),
                op(CobOpCode::PushConstant), 100_000,
                op(CobOpCode::Sleep),
                op(CobOpCode::PushConstant), 0,
                op(CobOpCode::Return),
                // Killer: mask 2 as well, signals 2.
                op(CobOpCode::PushConstant), 2,
                op(CobOpCode::SetSignalMask),
                op(CobOpCode::PushConstant), 2,
                op(CobOpCode::Signal),
                op(CobOpCode::PushConstant), 0,
                op(CobOpCode::Return),
            ],
            &[("Waiter", 0), ("Killer", 9)],
        );
        let mut host = TestHost::new();
        let waiter = env.create_thread("Waiter", vec![]).unwrap();
        let bystander = env.create_thread("Main", vec![]);
        assert!(bystander.is_none());
        env.run_scripts(&mut host);
        assert!(env.is_thread_running(waiter));

        let killer = env.create_thread("Killer", vec![]).unwrap();
        env.run_scripts(&mut host);
        assert_eq!(env.thread_status(waiter), None);
        assert_eq!(env.thread_status(killer), Some(ThreadStatus::Finished));
    }

    #[test]
    fn test_start_script_inherits_signal_mask() {
        let mut env = environment(
            vec![
                op(CobOpCode::PushConstant), 4,
                op(CobOpCode::SetSignalMask),
                op(CobOpCode::StartScript), 1, 0,
                op(CobOpCode::PushConstant), 0,
                op(CobOpCode::Return),
                // Child sleeps.
                op(CobOpCode::PushConstant), 1000,
                op(CobOpCode::Sleep),
                op(CobOpCode::PushConstant), 0,
                op(CobOpCode::Return),
            ],
            &[("Parent", 0), ("Child", 9)],
        );
        let mut host = TestHost::new();
        env.create_thread("Parent", vec![]);
        env.run_scripts(&mut host);
        assert_eq!(env.thread_count(), 2);
        let child = env
            .threads
            .iter()
            .find(|(_, t)| t.name == "Child")
            .map(|(id, t)| (*id, t.signal_mask));
        assert_eq!(child.map(|(_, mask)| mask), Some(4));
    }

    #[test]
    fn test_queries_and_set_values_go_to_host() {
        let mut env = environment(
            vec![
                op(CobOpCode::PushConstant), 4,
                op(CobOpCode::GetUnitValue),
                op(CobOpCode::PopStatic), 0,
                op(CobOpCode::PushConstant), 1,
                op(CobOpCode::PushConstant), 1,
                op(CobOpCode::Set),
                op(CobOpCode::PushConstant), 0,
                op(CobOpCode::Return),
            ],
            &[("Main", 0)],
        );
        let mut host = TestHost::new();
        env.create_thread("Main", vec![]);
        env.run_scripts(&mut host);
        assert_eq!(env.statics()[0], 400);
        assert_eq!(host.values, vec![(CobValueId::Activation, 1)]);
    }

    #[test]
    fn test_call_synchronous_returns_locals() {
        let mut env = environment(
            vec![
                op(CobOpCode::CreateLocalVar),
                op(CobOpCode::PushConstant), 1,
                op(CobOpCode::PopLocalVar), 0,
                op(CobOpCode::PushConstant), 0,
                op(CobOpCode::Return),
                op(CobOpCode::PushConstant), 10,
                op(CobOpCode::Sleep),
                op(CobOpCode::PushConstant), 0,
                op(CobOpCode::Return),
            ],
            &[("QueryPrimary", 0), ("Sleepy", 8)],
        );
        let mut host = TestHost::new();
        assert_eq!(env.call_synchronous("QueryPrimary", vec![0], &mut host), Some(vec![1]));
        assert_eq!(env.call_synchronous("Sleepy", vec![], &mut host), None);
        assert_eq!(env.call_synchronous("Missing", vec![], &mut host), None);
        assert_eq!(env.thread_count(), 0);
    }

    #[test]
    fn test_thread_result_visible_until_reaped() {
        let mut env = environment(
            vec![op(CobOpCode::PushConstant), 1, op(CobOpCode::Return)],
            &[("AimPrimary", 0)],
        );
        let mut host = TestHost::new();
        let id = env.create_thread("AimPrimary", vec![0, 0]).unwrap();
        assert_eq!(env.thread_result(id), None);
        env.run_scripts(&mut host);
        assert_eq!(env.thread_result(id), Some(1));
        env.run_scripts(&mut host);
        assert_eq!(env.thread_result(id), None);
    }
}
