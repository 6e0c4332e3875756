// Copyright (C) 2025 Barn Authors. This program is free software: you can
// redistribute it and/or modify it under the terms of the GNU General Public
// License as published by the Free Software Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The task scheduler: a single-writer event loop. All mutation of the object
//! store, the task table and the connection registry happens on this thread.
//! Connection threads only enqueue events and wait for their per-line ack.

use crate::config::Config;
use crate::matching::WsMatchEnv;
use crate::tasks::command_parse::{parse_command, ParseCommandError, ParsedCommand};
use crate::tasks::dispatch::find_command_verb;
use crate::tasks::sessions::Sessions;
use crate::tasks::task::{Task, TaskKind, TaskState};
use crate::tasks::{
    connection_pseudo_player, ConnectionId, SchedulerControl, TaskDescription,
};
use crate::vm::{
    prepare_verb_activation, program_for_verb, Activation, ExecutionResult, VmExec, VmExecParams,
    VM,
};
use barn_common::model::VerbFlag;
use barn_common::tasks::{AbortLimitReason, Exception, TaskId};
use barn_common::util::parse_into_words;
use barn_compiler::SourceParser;
use barn_db::{ObjectStore, Snapshot};
use barn_var::ErrorCode::{E_INVARG, E_MAXREC, E_PERM};
use barn_var::{
    v_int, v_list, v_obj, v_str, Error, Obj, Symbol, Var, Variant, NOTHING, SYSTEM_OBJECT,
};
use bincode::{Decode, Encode};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};

const IDLE_POLL: Duration = Duration::from_millis(200);

/// Events produced by connection threads (and the host) for the scheduler.
pub enum SchedulerEvent {
    Connected {
        conn: ConnectionId,
    },
    /// One input line. The reader thread blocks on `ack` before reading the
    /// next line, which is what keeps task creation in input order.
    Line {
        conn: ConnectionId,
        line: String,
        ack: Option<Sender<()>>,
    },
    Disconnected {
        conn: ConnectionId,
    },
    Shutdown,
}

/// The handle connection threads use to talk to the scheduler.
#[derive(Clone)]
pub struct SchedulerClient {
    tx: Sender<SchedulerEvent>,
}

impl SchedulerClient {
    pub fn connected(&self, conn: ConnectionId) {
        let _ = self.tx.send(SchedulerEvent::Connected { conn });
    }

    /// Submit a line and wait until the scheduler has turned it into a task
    /// (and run that task to completion or suspension).
    pub fn line(&self, conn: ConnectionId, line: String) {
        let (ack_tx, ack_rx) = bounded(1);
        if self
            .tx
            .send(SchedulerEvent::Line {
                conn,
                line,
                ack: Some(ack_tx),
            })
            .is_ok()
        {
            let _ = ack_rx.recv();
        }
    }

    pub fn disconnected(&self, conn: ConnectionId) {
        let _ = self.tx.send(SchedulerEvent::Disconnected { conn });
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(SchedulerEvent::Shutdown);
    }
}

struct ConnectionRecord {
    player: Option<Obj>,
    connected_at: Instant,
    last_activity: Instant,
}

/// An entry in the waiting heap; min-ordered by wake time, FIFO at equal times.
type WakeEntry = Reverse<(Instant, u64, TaskId)>;

/// Everything the builtins may touch while one task runs. The running task has
/// been taken out of `tasks`.
struct ControlView<'a> {
    tasks: &'a mut HashMap<TaskId, Task>,
    ready: &'a mut VecDeque<TaskId>,
    connections: &'a HashMap<ConnectionId, ConnectionRecord>,
    player_conns: &'a HashMap<Obj, ConnectionId>,
    boot_requests: &'a mut Vec<Obj>,
    shutdown: &'a mut Option<Option<String>>,
    checkpoint_requested: &'a mut bool,
}

impl SchedulerControl for ControlView<'_> {
    fn queued_tasks(&self) -> Vec<TaskDescription> {
        let now = Instant::now();
        self.tasks
            .values()
            .map(|t| {
                let a = t.vm.top();
                TaskDescription {
                    task_id: t.task_id,
                    player: t.player,
                    programmer: a.permissions,
                    verb_definer: a.definer,
                    verb_name: a.verb_name.to_string(),
                    line: a.frame.line_no(),
                    this: a.this.clone(),
                    wake_in: t
                        .wake_at
                        .map(|w| w.saturating_duration_since(now).as_secs_f64()),
                }
            })
            .collect()
    }

    fn kill_task(&mut self, id: TaskId, who: Obj, wizard: bool) -> Result<(), Error> {
        let Some(task) = self.tasks.get_mut(&id) else {
            return Err(E_INVARG.msg("no such task"));
        };
        if !wizard && task.perms != who && task.player != who {
            return Err(E_PERM.into());
        }
        match task.state {
            // Parked tasks go away at once; a stale waiting-heap entry is
            // skipped when it pops.
            TaskState::Suspended => {
                self.tasks.remove(&id);
            }
            // A task already in the ready queue is dropped when dequeued.
            _ => task.state = TaskState::Killed,
        }
        Ok(())
    }

    fn resume_task(
        &mut self,
        id: TaskId,
        value: Var,
        who: Obj,
        wizard: bool,
    ) -> Result<(), Error> {
        let Some(task) = self.tasks.get_mut(&id) else {
            return Err(E_INVARG.msg("no such task"));
        };
        if task.state != TaskState::Suspended {
            return Err(E_INVARG.msg("task is not suspended"));
        }
        if !wizard && task.perms != who && task.player != who {
            return Err(E_PERM.into());
        }
        task.state = TaskState::Queued;
        task.wake_at = None;
        task.resume_value = Some(value);
        self.ready.push_back(id);
        Ok(())
    }

    fn connected_players(&self) -> Vec<Obj> {
        let mut players: Vec<Obj> = self.player_conns.keys().copied().collect();
        players.sort();
        players
    }

    fn connection_for(&self, player: &Obj) -> Option<ConnectionId> {
        self.player_conns.get(player).copied().or_else(|| {
            // Pre-login pseudo players route to their connection directly.
            crate::tasks::pseudo_player_connection(player)
        })
    }

    fn connection_name(&self, player: &Obj) -> Option<String> {
        self.connection_for(player)
            .map(|conn| format!("connection {conn}"))
    }

    fn connected_seconds(&self, player: &Obj) -> Option<f64> {
        let conn = self.player_conns.get(player)?;
        self.connections
            .get(conn)
            .map(|r| r.connected_at.elapsed().as_secs_f64())
    }

    fn idle_seconds(&self, player: &Obj) -> Option<f64> {
        let conn = self.player_conns.get(player)?;
        self.connections
            .get(conn)
            .map(|r| r.last_activity.elapsed().as_secs_f64())
    }

    fn boot_player(&mut self, player: &Obj) {
        self.boot_requests.push(*player);
    }

    fn request_shutdown(&mut self, message: Option<String>) {
        *self.shutdown = Some(message);
    }

    fn request_checkpoint(&mut self) {
        *self.checkpoint_requested = true;
    }
}

/// A suspended task as it goes into a checkpoint.
#[derive(Encode, Decode)]
struct SuspendedTaskRecord {
    vm: VmExec,
    player: Obj,
    perms: Obj,
    wake_at_epoch: Option<u64>,
}

#[derive(Encode, Decode)]
struct TasksSnapshot {
    tasks: Vec<SuspendedTaskRecord>,
    next_task_id: u64,
}

/// Responsible for the dispatching, control, and accounting of tasks in the
/// system. There is one scheduler per server, and it owns the object store.
pub struct Scheduler {
    pub world: ObjectStore,
    vm: VM,
    config: Arc<Config>,
    params: VmExecParams,
    sessions: Arc<dyn Sessions>,
    events_rx: Receiver<SchedulerEvent>,

    next_task_id: TaskId,
    tasks: HashMap<TaskId, Task>,
    ready: VecDeque<TaskId>,
    waiting: BinaryHeap<WakeEntry>,
    wake_seq: u64,
    /// Tasks blocked in `read()`, by connection.
    input_waiters: HashMap<ConnectionId, TaskId>,

    connections: HashMap<ConnectionId, ConnectionRecord>,
    player_conns: HashMap<Obj, ConnectionId>,

    boot_requests: Vec<Obj>,
    shutdown: Option<Option<String>>,
    checkpoint_requested: bool,
    last_checkpoint: Instant,
}

impl Scheduler {
    pub fn new(
        world: ObjectStore,
        parser: Arc<dyn SourceParser>,
        config: Arc<Config>,
        sessions: Arc<dyn Sessions>,
    ) -> (Self, SchedulerClient) {
        let (tx, events_rx) = unbounded();
        let params = VmExecParams {
            parser,
            max_stack_depth: config.max_stack_depth,
        };
        let scheduler = Scheduler {
            world,
            vm: VM::new(),
            config,
            params,
            sessions,
            events_rx,
            next_task_id: 1,
            tasks: HashMap::new(),
            ready: VecDeque::new(),
            waiting: BinaryHeap::new(),
            wake_seq: 0,
            input_waiters: HashMap::new(),
            connections: HashMap::new(),
            player_conns: HashMap::new(),
            boot_requests: vec![],
            shutdown: None,
            checkpoint_requested: false,
            last_checkpoint: Instant::now(),
        };
        (scheduler, SchedulerClient { tx })
    }

    /// The main loop. Runs until a shutdown request arrives.
    pub fn run(mut self) {
        info!("scheduler running");
        loop {
            if let Some(message) = self.shutdown.take() {
                self.handle_shutdown(message);
                break;
            }

            self.wake_due_tasks();

            while let Some(task_id) = self.ready.pop_front() {
                let Some(task) = self.tasks.remove(&task_id) else {
                    continue;
                };
                if task.state == TaskState::Killed {
                    continue;
                }
                self.run_task(task);
                self.process_boot_requests();
            }

            if self.checkpoint_due() {
                self.checkpoint();
            }

            // Sleep until the next wake or event.
            let timeout = self
                .next_wake()
                .map(|wake| wake.saturating_duration_since(Instant::now()))
                .unwrap_or(IDLE_POLL)
                .min(IDLE_POLL);
            match self.events_rx.recv_timeout(timeout) {
                Ok(event) => {
                    self.handle_event(event);
                    // Drain whatever else arrived.
                    while let Ok(event) = self.events_rx.try_recv() {
                        self.handle_event(event);
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    warn!("event channel closed; shutting down");
                    break;
                }
            }
        }
        info!("scheduler stopped");
    }

    fn handle_shutdown(&mut self, message: Option<String>) {
        let message = message.unwrap_or_else(|| "Server is shutting down.".to_string());
        for (conn, _) in self.connections.iter() {
            self.sessions.send_line(*conn, &message);
            self.sessions.flush(*conn);
            self.sessions.disconnect(*conn);
        }
        self.checkpoint();
    }

    fn next_wake(&self) -> Option<Instant> {
        self.waiting.peek().map(|Reverse((at, _, _))| *at)
    }

    fn wake_due_tasks(&mut self) {
        let now = Instant::now();
        while let Some(Reverse((at, _, task_id))) = self.waiting.peek().copied() {
            if at > now {
                break;
            }
            self.waiting.pop();
            let Some(task) = self.tasks.get_mut(&task_id) else {
                continue;
            };
            // Entries go stale when a task was resumed or killed first.
            if task.state == TaskState::Killed {
                self.tasks.remove(&task_id);
                continue;
            }
            if task.state != TaskState::Suspended && task.state != TaskState::Queued {
                continue;
            }
            if task.wake_at.is_none() {
                continue;
            }
            task.wake_at = None;
            task.state = TaskState::Queued;
            self.ready.push_back(task_id);
        }
    }

    fn allocate_task_id(&mut self) -> TaskId {
        let id = self.next_task_id;
        self.next_task_id += 1;
        id
    }

    fn park_timed(&mut self, mut task: Task, wake: Instant) {
        task.state = TaskState::Suspended;
        task.wake_at = Some(wake);
        self.wake_seq += 1;
        self.waiting
            .push(Reverse((wake, self.wake_seq, task.task_id)));
        self.tasks.insert(task.task_id, task);
    }

    fn park_indefinite(&mut self, mut task: Task) {
        task.state = TaskState::Suspended;
        task.wake_at = None;
        self.tasks.insert(task.task_id, task);
    }

    // ---- event handling ----

    fn handle_event(&mut self, event: SchedulerEvent) {
        match event {
            SchedulerEvent::Connected { conn } => {
                self.connections.insert(
                    conn,
                    ConnectionRecord {
                        player: None,
                        connected_at: Instant::now(),
                        last_activity: Instant::now(),
                    },
                );
                // The welcome banner: do_login_command with no arguments.
                self.submit_login_task(conn, &[]);
                self.sessions.flush(conn);
            }
            SchedulerEvent::Line { conn, line, ack } => {
                self.handle_line(conn, line);
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
            SchedulerEvent::Disconnected { conn } => {
                self.handle_disconnect(conn);
            }
            SchedulerEvent::Shutdown => {
                self.shutdown = Some(None);
            }
        }
    }

    fn handle_line(&mut self, conn: ConnectionId, line: String) {
        if let Some(record) = self.connections.get_mut(&conn) {
            record.last_activity = Instant::now();
        } else {
            warn!(conn, "line from unknown connection");
            return;
        }

        // A task blocked in read() on this connection gets the line directly.
        if let Some(task_id) = self.input_waiters.remove(&conn) {
            if let Some(task) = self.tasks.get_mut(&task_id) {
                task.state = TaskState::Queued;
                task.resume_value = Some(v_str(&line));
                self.ready.push_back(task_id);
                self.run_ready_now();
            }
            return;
        }

        let player = self.connections.get(&conn).and_then(|r| r.player);
        match player {
            None => {
                let words = parse_into_words(&line);
                self.submit_login_task(conn, &words);
                self.sessions.flush(conn);
            }
            Some(player) => {
                // The eval intrinsic comes before command dispatch.
                let trimmed = line.trim_start();
                if let Some(code) = trimmed.strip_prefix(';') {
                    self.submit_eval_task(conn, player, code.to_string());
                } else if let Some(code) = strip_word(trimmed, "EVAL") {
                    self.submit_eval_task(conn, player, code);
                } else {
                    self.submit_command_task(conn, player, &line);
                }
            }
        }
        self.run_ready_now();
        self.sessions.flush(conn);
    }

    /// Process everything currently ready; used after event-driven task
    /// creation so a line's task runs before the line is acked.
    fn run_ready_now(&mut self) {
        while let Some(task_id) = self.ready.pop_front() {
            let Some(task) = self.tasks.remove(&task_id) else {
                continue;
            };
            if task.state == TaskState::Killed {
                continue;
            }
            self.run_task(task);
            self.process_boot_requests();
        }
    }

    fn handle_disconnect(&mut self, conn: ConnectionId) {
        let Some(record) = self.connections.remove(&conn) else {
            return;
        };
        self.input_waiters.remove(&conn);
        if let Some(player) = record.player {
            self.player_conns.remove(&player);
            self.submit_hook_task("user_disconnected", &[v_obj(player)], player);
            self.run_ready_now();
        }
    }

    // ---- task creation ----

    /// `#0:do_login_command(@words)` for an unlogged connection.
    fn submit_login_task(&mut self, conn: ConnectionId, words: &[String]) {
        let pseudo = connection_pseudo_player(conn);
        let args: Vec<Var> = words.iter().map(|w| v_str(w)).collect();
        let verb = Symbol::mk("do_login_command");
        let activation = match prepare_verb_activation(
            &mut self.world,
            &self.params.parser,
            v_obj(SYSTEM_OBJECT),
            verb,
            v_list(&args),
            pseudo,
            v_obj(NOTHING),
            None,
        ) {
            Ok(a) => a,
            Err(e) => {
                warn!(error = %e, "no usable #0:do_login_command");
                self.sessions
                    .send_line(conn, "The server is not accepting logins.");
                return;
            }
        };
        let perms = activation.permissions;
        let task_id = self.allocate_task_id();
        let mut task = Task::new(
            task_id,
            TaskKind::Hook,
            pseudo,
            perms,
            activation,
            &self.config,
            Some(conn),
            self.world.anon_watermark(),
        );
        task.login_conn = Some(conn);
        self.tasks.insert(task_id, task);
        self.ready.push_back(task_id);
        self.run_ready_now();
    }

    /// A server hook on #0; silently skipped when the verb does not exist.
    fn submit_hook_task(&mut self, verb: &str, args: &[Var], player: Obj) {
        let verb = Symbol::mk(verb);
        if self
            .world
            .find_callable_verb(&SYSTEM_OBJECT, verb)
            .is_none()
        {
            return;
        }
        let activation = match prepare_verb_activation(
            &mut self.world,
            &self.params.parser,
            v_obj(SYSTEM_OBJECT),
            verb,
            v_list(args),
            player,
            v_obj(NOTHING),
            None,
        ) {
            Ok(a) => a,
            Err(e) => {
                warn!(error = %e, %verb, "hook failed to prepare");
                return;
            }
        };
        let perms = activation.permissions;
        let task_id = self.allocate_task_id();
        let task = Task::new(
            task_id,
            TaskKind::Hook,
            player,
            perms,
            activation,
            &self.config,
            self.player_conns.get(&player).copied(),
            self.world.anon_watermark(),
        );
        self.tasks.insert(task_id, task);
        self.ready.push_back(task_id);
    }

    /// Parse a command line, resolve its objects, find its verb, build the task.
    fn submit_command_task(&mut self, conn: ConnectionId, player: Obj, line: &str) {
        let parsed = {
            let env = WsMatchEnv { ws: &self.world };
            parse_command(line, &env, &player)
        };
        let parsed: ParsedCommand = match parsed {
            Ok(parsed) => parsed,
            Err(ParseCommandError::EmptyCommand) => return,
            Err(e) => {
                warn!(error = %e, "command parse failure");
                self.sessions.send_line(conn, "I couldn't understand that.");
                return;
            }
        };

        let found = find_command_verb(&self.world, &player, &parsed);
        let (this, definer, index) = match found {
            Some(m) => (m.this, m.definer, m.index),
            None => {
                // No matching verb anywhere: the do_command fallback, then a
                // shrug.
                let do_command = Symbol::mk("do_command");
                if self
                    .world
                    .find_callable_verb(&SYSTEM_OBJECT, do_command)
                    .is_some()
                {
                    self.submit_hook_task(
                        "do_command",
                        &parsed.args.clone(),
                        player,
                    );
                    return;
                }
                self.sessions.send_line(conn, "I couldn't understand that.");
                return;
            }
        };

        let program =
            match program_for_verb(&mut self.world, &self.params.parser, &definer, index) {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "command verb failed to compile");
                    self.sessions.send_line(conn, "I couldn't understand that.");
                    return;
                }
            };
        let vd = self
            .world
            .verb(&definer, index)
            .expect("verb vanished")
            .def
            .clone();
        let verb = Symbol::mk(&parsed.verb);
        let args = v_list(&parsed.args);
        let activation = Activation::for_verb(
            program,
            v_obj(this),
            player,
            v_obj(player),
            verb,
            definer,
            vd.owner,
            vd.flags.contains(VerbFlag::Debug),
            args,
            Some(parsed),
        );
        let task_id = self.allocate_task_id();
        let task = Task::new(
            task_id,
            TaskKind::Input,
            player,
            vd.owner,
            activation,
            &self.config,
            Some(conn),
            self.world.anon_watermark(),
        );
        self.tasks.insert(task_id, task);
        self.ready.push_back(task_id);
    }

    /// The `;` intrinsic: compile and run code as the player, emitting the
    /// `{1, value}` / `{2, {code, msg, value}}` / `{0, {messages}}` framing.
    fn submit_eval_task(&mut self, conn: ConnectionId, player: Obj, code: String) {
        let compiled = self
            .params
            .parser
            .parse_program(&code)
            .and_then(barn_compiler::compile);
        let program = match compiled {
            Ok(program) => program,
            Err(e) => {
                let result = v_list(&[v_int(0), v_list(&[v_str(&e.to_string())])]);
                self.sessions
                    .send_eval_result(conn, &[barn_var::to_literal(&result)]);
                self.sessions.flush(conn);
                return;
            }
        };
        let activation = Activation::for_eval(program, player, player);
        let task_id = self.allocate_task_id();
        let mut task = Task::new(
            task_id,
            TaskKind::Input,
            player,
            player,
            activation,
            &self.config,
            Some(conn),
            self.world.anon_watermark(),
        );
        task.is_eval = true;
        self.tasks.insert(task_id, task);
        self.ready.push_back(task_id);
    }

    /// Create the child task for a fork, binding the child id into both the
    /// parent frame and the child's copied environment.
    fn dispatch_fork(&mut self, parent: &mut Task, fork: crate::vm::Fork) {
        let child_id = self.allocate_task_id();
        let mut activation = fork.activation;
        if let Some(var) = fork.var {
            parent
                .vm
                .top_mut()
                .frame
                .set_env(&var, v_int(child_id as i64));
            activation.frame.set_env(&var, v_int(child_id as i64));
        }
        let mut child = Task::new(
            child_id,
            TaskKind::Forked,
            fork.player,
            fork.progr,
            activation,
            &self.config,
            parent.conn,
            self.world.anon_watermark(),
        );
        child.state = TaskState::Suspended;
        let wake = Instant::now() + fork.delay.unwrap_or(Duration::ZERO);
        self.park_timed(child, wake);
    }

    // ---- task execution ----

    fn run_task(&mut self, mut task: Task) {
        task.state = TaskState::Running;
        if let Some(value) = task.resume_value.take() {
            task.vm.top_mut().frame.push(value);
        }
        task.vm.reset_clock();

        loop {
            let result = {
                let mut view = ControlView {
                    tasks: &mut self.tasks,
                    ready: &mut self.ready,
                    connections: &self.connections,
                    player_conns: &self.player_conns,
                    boot_requests: &mut self.boot_requests,
                    shutdown: &mut self.shutdown,
                    checkpoint_requested: &mut self.checkpoint_requested,
                };
                self.vm.exec(
                    &self.params,
                    &mut task.vm,
                    &mut self.world,
                    self.sessions.as_ref(),
                    &mut view,
                )
            };
            match result {
                ExecutionResult::More => continue,
                ExecutionResult::DispatchFork(fork) => {
                    self.dispatch_fork(&mut task, fork);
                    continue;
                }
                ExecutionResult::Complete(value) => {
                    self.task_completed(task, value);
                    return;
                }
                ExecutionResult::Exception(exception) => {
                    self.task_excepted(task, exception);
                    return;
                }
                ExecutionResult::Abort(reason) => {
                    self.task_aborted(task, reason);
                    return;
                }
                ExecutionResult::Suspend(Some(delay)) => {
                    let task_id = task.task_id;
                    task.resume_value = Some(v_int(0));
                    task.rearm_for_resume(&self.config);
                    self.flush_task(&task);
                    self.park_timed(task, Instant::now() + delay);
                    info!(task = task_id, "task suspended");
                    return;
                }
                ExecutionResult::Suspend(None) => {
                    task.resume_value = Some(v_int(0));
                    task.rearm_for_resume(&self.config);
                    self.flush_task(&task);
                    self.park_indefinite(task);
                    return;
                }
                ExecutionResult::NeedInput => {
                    let Some(conn) = task.conn else {
                        // No connection to read from; the task unblocks with 0.
                        task.vm.top_mut().frame.push(v_int(0));
                        continue;
                    };
                    self.input_waiters.insert(conn, task.task_id);
                    task.rearm_for_resume(&self.config);
                    self.flush_task(&task);
                    self.park_indefinite(task);
                    return;
                }
            }
        }
    }

    fn flush_task(&self, task: &Task) {
        if let Some(conn) = task.conn {
            self.sessions.flush(conn);
        }
    }

    fn task_completed(&mut self, mut task: Task, value: Var) {
        task.state = TaskState::Completed;
        if task.is_eval {
            if let Some(conn) = task.conn {
                let result = v_list(&[v_int(1), value.clone()]);
                self.sessions
                    .send_eval_result(conn, &[barn_var::to_literal(&result)]);
            }
        }
        if let Some(conn) = task.login_conn {
            self.finish_login(conn, &value);
        }
        self.flush_task(&task);
        self.sweep_anonymous(&task);
    }

    fn task_excepted(&mut self, task: Task, exception: Exception) {
        // The eval intrinsic frames runtime errors instead of printing a
        // traceback.
        if task.is_eval {
            if let Some(conn) = task.conn {
                let e = &exception.error;
                // The message slot carries only what raise() attached; plain
                // errors frame as {2, {E_XXX, "", 0}}.
                let msg = e.msg.as_ref().map(|m| m.as_str()).unwrap_or("");
                let result = v_list(&[
                    v_int(2),
                    v_list(&[
                        barn_var::v_err(e.code),
                        v_str(msg),
                        e.value.as_deref().cloned().unwrap_or_else(|| v_int(0)),
                    ]),
                ]);
                self.sessions
                    .send_eval_result(conn, &[barn_var::to_literal(&result)]);
            }
            self.flush_task(&task);
            self.sweep_anonymous(&task);
            return;
        }

        let lines = exception.traceback_lines();
        for line in &lines {
            error!(task = task.task_id, player = %task.player, "{line}");
        }
        if let Some(conn) = task.conn {
            for line in &lines {
                self.sessions.send_line(conn, line);
            }
        }
        self.flush_task(&task);
        self.sweep_anonymous(&task);
    }

    fn task_aborted(&mut self, task: Task, reason: AbortLimitReason) {
        let message = match reason {
            AbortLimitReason::Ticks(t) => {
                format!("Task ran out of ticks (limit {t}).")
            }
            AbortLimitReason::Time(s) => format!("Task ran out of seconds (limit {s})."),
            AbortLimitReason::Killed => {
                info!(task = task.task_id, "task killed");
                self.flush_task(&task);
                self.sweep_anonymous(&task);
                return;
            }
        };
        warn!(task = task.task_id, player = %task.player, "{message}");
        // The abort is not catchable, but the player still gets a traceback.
        let exception = task.vm.exception_for(E_MAXREC.msg(message.clone()));
        if let Some(conn) = task.conn {
            self.sessions.send_line(conn, &message);
            for line in exception.traceback_lines() {
                self.sessions.send_line(conn, &line);
            }
        }
        self.flush_task(&task);
        self.sweep_anonymous(&task);
    }

    /// Inspect a login task's return value; a valid player object promotes the
    /// connection.
    fn finish_login(&mut self, conn: ConnectionId, value: &Var) {
        let Variant::Obj(player) = value.variant() else {
            return;
        };
        let player = *player;
        let is_player_obj = self
            .world
            .get(&player)
            .map(|o| o.is_player())
            .unwrap_or(false);
        if !is_player_obj {
            return;
        }
        if !self.connections.contains_key(&conn) {
            return;
        }

        // Another connection already holds the player: boot it with a farewell.
        let reconnected = match self.player_conns.get(&player).copied() {
            Some(old_conn) if old_conn != conn => {
                self.sessions
                    .send_line(old_conn, "*** Redirecting connection to new port ***");
                self.sessions.flush(old_conn);
                self.sessions.disconnect(old_conn);
                self.connections.remove(&old_conn);
                true
            }
            Some(_) => return,
            None => false,
        };

        if let Some(record) = self.connections.get_mut(&conn) {
            record.player = Some(player);
        }
        self.player_conns.insert(player, conn);
        info!(%player, conn, reconnected, "player logged in");

        let hook = if reconnected {
            "user_reconnected"
        } else {
            "user_connected"
        };
        self.submit_hook_task(hook, &[v_obj(player)], player);
        self.run_ready_now();
    }

    fn process_boot_requests(&mut self) {
        let requests = std::mem::take(&mut self.boot_requests);
        for player in requests {
            let Some(conn) = self.player_conns.remove(&player) else {
                continue;
            };
            self.sessions.send_line(conn, "*** Disconnected ***");
            self.sessions.flush(conn);
            self.sessions.disconnect(conn);
            self.connections.remove(&conn);
            self.submit_hook_task("user_disconnected", &[v_obj(player)], player);
            self.run_ready_now();
        }
    }

    // ---- anonymous object collection ----

    /// On task completion, recycle anonymous objects created since the task
    /// started that are no longer reachable from any live task or the store.
    fn sweep_anonymous(&mut self, task: &Task) {
        let watermark = task.anon_watermark;
        if watermark >= self.world.anon_watermark() {
            return;
        }
        let mut reachable = HashSet::new();
        for t in self.tasks.values() {
            collect_vm_anon_refs(&t.vm, &mut reachable);
            if let Some(v) = &t.resume_value {
                let mut seen_waifs = HashSet::new();
                collect_anon_refs(v, &mut reachable, &mut seen_waifs);
            }
        }
        // Values stored into the object graph also keep anonymous objects alive.
        let mut seen_waifs = HashSet::new();
        for object in self.world.objects() {
            for entry in object.properties.values() {
                if let Some(v) = &entry.value {
                    collect_anon_refs(v, &mut reachable, &mut seen_waifs);
                }
            }
        }
        let collected = self.world.sweep_anonymous(watermark, &reachable);
        if collected > 0 {
            info!(task = task.task_id, collected, "collected anonymous objects");
        }
    }

    // ---- checkpointing ----

    fn checkpoint_due(&self) -> bool {
        if self.checkpoint_requested {
            return true;
        }
        match self.config.checkpoint_interval {
            Some(interval) => self.last_checkpoint.elapsed() >= interval,
            None => false,
        }
    }

    /// Write a checkpoint: the object graph and every suspended task, omitting
    /// anonymous objects no suspended task can reach.
    pub fn checkpoint(&mut self) {
        self.checkpoint_requested = false;
        self.last_checkpoint = Instant::now();
        let Some(path) = self.config.checkpoint_path.clone() else {
            return;
        };

        let now = Instant::now();
        let records: Vec<SuspendedTaskRecord> = self
            .tasks
            .values()
            .filter(|t| t.state == TaskState::Suspended || t.state == TaskState::Queued)
            .map(|t| SuspendedTaskRecord {
                vm: t.vm.clone(),
                player: t.player,
                perms: t.perms,
                wake_at_epoch: t.wake_at.map(|w| {
                    let delta = w.saturating_duration_since(now);
                    (SystemTime::now() + delta)
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_secs())
                        .unwrap_or(0)
                }),
            })
            .collect();
        let snapshot_tasks = TasksSnapshot {
            tasks: records,
            next_task_id: self.next_task_id as u64,
        };
        let blob = match bincode::encode_to_vec(&snapshot_tasks, bincode::config::standard()) {
            Ok(blob) => blob,
            Err(e) => {
                error!(error = %e, "failed to serialize suspended tasks");
                return;
            }
        };

        // Anonymous objects only live on if a suspended task still sees them.
        let mut reachable = HashSet::new();
        for t in self.tasks.values() {
            collect_vm_anon_refs(&t.vm, &mut reachable);
        }
        let mut exclude = HashSet::new();
        for object in self.world.objects() {
            if object.anonymous && !reachable.contains(&object.id) {
                exclude.insert(object.id);
            }
        }

        let snapshot = Snapshot::capture(&self.world, &exclude, blob);
        if let Err(e) = barn_db::write_snapshot(&path, &snapshot) {
            error!(error = %e, "checkpoint write failed");
        }
    }

    /// Re-park the suspended tasks from a checkpoint blob; called at startup
    /// after the store restore.
    pub fn restore_tasks(&mut self, blob: &[u8]) {
        if blob.is_empty() {
            return;
        }
        let snapshot: TasksSnapshot =
            match bincode::decode_from_slice(blob, bincode::config::standard()) {
                Ok((snapshot, _)) => snapshot,
                Err(e) => {
                    error!(error = %e, "could not decode suspended tasks; dropping them");
                    return;
                }
            };
        self.next_task_id = (snapshot.next_task_id as TaskId).max(self.next_task_id);
        let now_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        for record in snapshot.tasks {
            let task_id = record.vm.task_id;
            let mut task = Task::new(
                task_id,
                TaskKind::Forked,
                record.player,
                record.perms,
                // Placeholder root; the real stack comes from the record.
                record.vm.top().clone(),
                &self.config,
                None,
                self.world.anon_watermark(),
            );
            task.vm = record.vm;
            task.resume_value = Some(v_int(0));
            match record.wake_at_epoch {
                Some(epoch) => {
                    let delay = Duration::from_secs(epoch.saturating_sub(now_epoch));
                    self.park_timed(task, Instant::now() + delay);
                }
                None => self.park_indefinite(task),
            }
        }
        info!(count = self.tasks.len(), "restored suspended tasks");
    }
}

fn strip_word(line: &str, word: &str) -> Option<String> {
    let rest = line.strip_prefix(word)?;
    if rest.starts_with(' ') {
        Some(rest.trim_start().to_string())
    } else {
        None
    }
}

/// Walk a value for anonymous-object references. Waifs are the one value that
/// can alias (and so cycle); `seen_waifs` breaks those cycles.
fn collect_anon_refs(v: &Var, into: &mut HashSet<Obj>, seen_waifs: &mut HashSet<usize>) {
    match v.variant() {
        Variant::Anon(o) => {
            into.insert(*o);
        }
        Variant::List(l) => {
            for e in l.iter() {
                collect_anon_refs(&e, into, seen_waifs);
            }
        }
        Variant::Map(m) => {
            for (k, val) in m.iter() {
                collect_anon_refs(&k, into, seen_waifs);
                collect_anon_refs(&val, into, seen_waifs);
            }
        }
        Variant::Err(e) => {
            if let Some(value) = &e.value {
                collect_anon_refs(value, into, seen_waifs);
            }
        }
        Variant::Waif(w) => {
            if seen_waifs.insert(w.identity()) {
                for value in w.property_values() {
                    collect_anon_refs(&value, into, seen_waifs);
                }
            }
        }
        _ => {}
    }
}

fn collect_vm_anon_refs(vm: &VmExec, into: &mut HashSet<Obj>) {
    let mut seen_waifs = HashSet::new();
    collect_anon_refs(&vm.task_local, into, &mut seen_waifs);
    for a in &vm.stack {
        collect_anon_refs(&a.this, into, &mut seen_waifs);
        collect_anon_refs(&a.caller, into, &mut seen_waifs);
        collect_anon_refs(&a.args, into, &mut seen_waifs);
        for v in &a.frame.valstack {
            collect_anon_refs(v, into, &mut seen_waifs);
        }
        for v in a.frame.env.iter().flatten() {
            collect_anon_refs(v, into, &mut seen_waifs);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::sessions::BufferedSessions;
    use crate::tasks::task::TaskState;
    use barn_common::model::{ArgSpec, PrepSpec, VerbArgsSpec, VerbDef};
    use barn_compiler::ast::StmtNode;
    use barn_compiler::testing::*;
    use barn_compiler::{CompileError, Parse};
    use barn_var::v_empty_list;
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex;

    /// A parser stand-in that serves canned ASTs for known source strings.
    struct TestParser {
        programs: Mutex<StdHashMap<String, Parse>>,
    }

    impl TestParser {
        fn new() -> Self {
            TestParser {
                programs: Mutex::new(StdHashMap::new()),
            }
        }

        fn learn(&self, source: &str, parse: Parse) {
            self.programs
                .lock()
                .unwrap()
                .insert(source.to_string(), parse);
        }
    }

    impl SourceParser for TestParser {
        fn parse_program(&self, source: &str) -> Result<Parse, CompileError> {
            self.programs
                .lock()
                .unwrap()
                .get(source.trim())
                .cloned()
                .ok_or_else(|| CompileError::ParseFailure(format!("unknown source: {source}")))
        }
    }

    fn command_spec() -> VerbArgsSpec {
        VerbArgsSpec {
            dobj: ArgSpec::None,
            prep: PrepSpec::None,
            iobj: ArgSpec::None,
        }
    }

    fn install_compiled_verb(
        world: &mut ObjectStore,
        on: &Obj,
        names: &str,
        args: VerbArgsSpec,
        parse: Parse,
    ) {
        let index = world
            .add_verb(
                on,
                VerbDef {
                    names: names.into(),
                    owner: Obj(0),
                    flags: VerbFlag::rxd(),
                    args,
                },
                String::new(),
            )
            .unwrap();
        let program = barn_compiler::compile(parse).unwrap();
        world.cache_verb_program(on, index, program);
    }

    /// A world with #0:do_login_command returning player #2, and a `ping`
    /// command verb on the player that notifies "pong".
    fn test_world() -> (ObjectStore, Obj) {
        let mut world = ObjectStore::new();
        let system = world.create(vec![], Obj(0), false, None).unwrap();
        assert_eq!(system, SYSTEM_OBJECT);
        // Hooks run as the verb owner (#0); it needs the wizard bit to notify
        // arbitrary players.
        world
            .get_mut(&system)
            .unwrap()
            .flags
            .set(barn_common::model::ObjFlag::Wizard);
        let _room = world.create(vec![], Obj(0), false, None).unwrap();
        let player = world.create(vec![], Obj(0), false, None).unwrap();
        world
            .get_mut(&player)
            .unwrap()
            .flags
            .set(barn_common::model::ObjFlag::User);
        world
            .get_mut(&player)
            .unwrap()
            .flags
            .set(barn_common::model::ObjFlag::Wizard);

        // do_login_command: empty args produce a banner, anything else logs in.
        let mut b = AstBuilder::new();
        let args_slot = b.names.find_name("args").unwrap();
        let banner = b.nested(|b| {
            let player_slot = b.names.find_name("player").unwrap();
            b.expr_stmt(builtin(
                "notify",
                vec![ident(player_slot), stre("Welcome to the barn.")],
            ));
            b.ret0();
        });
        b.push(StmtNode::Cond {
            arms: vec![cond_arm(
                not(builtin("length", vec![ident(args_slot)])),
                banner,
            )],
            otherwise: vec![],
        });
        b.ret(obj(player.0));
        install_compiled_verb(
            &mut world,
            &SYSTEM_OBJECT,
            "do_login_command",
            command_spec(),
            b.parse(),
        );

        // ping -> notify(player, "pong")
        let mut b = AstBuilder::new();
        let player_slot = b.names.find_name("player").unwrap();
        b.expr_stmt(builtin(
            "notify",
            vec![ident(player_slot), stre("pong")],
        ));
        b.ret0();
        install_compiled_verb(&mut world, &player, "ping", command_spec(), b.parse());

        (world, player)
    }

    fn scheduler_with(world: ObjectStore, parser: Arc<dyn SourceParser>) -> (Scheduler, Arc<BufferedSessions>) {
        let sessions = Arc::new(BufferedSessions::new());
        let (scheduler, _client) = Scheduler::new(
            world,
            parser,
            Arc::new(Config::default()),
            sessions.clone(),
        );
        (scheduler, sessions)
    }

    #[test]
    fn connection_gets_welcome_banner() {
        let (world, _) = test_world();
        let (mut scheduler, sessions) = scheduler_with(world, Arc::new(TestParser::new()));
        scheduler.handle_event(SchedulerEvent::Connected { conn: 1 });
        assert_eq!(sessions.lines_for(1), vec!["Welcome to the barn."]);
    }

    #[test]
    fn login_promotes_connection_and_runs_commands() {
        let (world, player) = test_world();
        let (mut scheduler, sessions) = scheduler_with(world, Arc::new(TestParser::new()));
        scheduler.handle_event(SchedulerEvent::Connected { conn: 1 });
        scheduler.handle_event(SchedulerEvent::Line {
            conn: 1,
            line: "connect tester".into(),
            ack: None,
        });
        assert_eq!(scheduler.player_conns.get(&player), Some(&1));

        scheduler.handle_event(SchedulerEvent::Line {
            conn: 1,
            line: "ping".into(),
            ack: None,
        });
        let lines = sessions.lines_for(1);
        assert_eq!(lines.last().unwrap(), "pong");
    }

    #[test]
    fn unknown_command_is_not_understood() {
        let (world, _) = test_world();
        let (mut scheduler, sessions) = scheduler_with(world, Arc::new(TestParser::new()));
        scheduler.handle_event(SchedulerEvent::Connected { conn: 1 });
        scheduler.handle_event(SchedulerEvent::Line {
            conn: 1,
            line: "connect".into(),
            ack: None,
        });
        scheduler.handle_event(SchedulerEvent::Line {
            conn: 1,
            line: "frobnicate the baz".into(),
            ack: None,
        });
        let lines = sessions.lines_for(1);
        assert_eq!(lines.last().unwrap(), "I couldn't understand that.");
    }

    #[test]
    fn reconnection_boots_the_old_connection() {
        let (world, player) = test_world();
        let (mut scheduler, _sessions) = scheduler_with(world, Arc::new(TestParser::new()));
        scheduler.handle_event(SchedulerEvent::Connected { conn: 1 });
        scheduler.handle_event(SchedulerEvent::Line {
            conn: 1,
            line: "connect tester".into(),
            ack: None,
        });
        scheduler.handle_event(SchedulerEvent::Connected { conn: 2 });
        scheduler.handle_event(SchedulerEvent::Line {
            conn: 2,
            line: "connect tester".into(),
            ack: None,
        });
        assert_eq!(scheduler.player_conns.get(&player), Some(&2));
        assert!(!scheduler.connections.contains_key(&1));
    }

    #[test]
    fn eval_intrinsic_frames_results() {
        let (world, _player) = test_world();
        let parser = Arc::new(TestParser::new());

        // ";2 + 2" evaluates to {1, 4}.
        let mut b = AstBuilder::new();
        b.ret(add(int(2), int(2)));
        parser.learn("2 + 2", b.parse());
        // ";1/0" evaluates to {2, {E_DIV, msg, 0}}.
        let mut b = AstBuilder::new();
        b.ret(div(int(1), int(0)));
        parser.learn("1/0", b.parse());

        let (mut scheduler, sessions) = scheduler_with(world, parser);
        scheduler.handle_event(SchedulerEvent::Connected { conn: 1 });
        scheduler.handle_event(SchedulerEvent::Line {
            conn: 1,
            line: "connect tester".into(),
            ack: None,
        });

        scheduler.handle_event(SchedulerEvent::Line {
            conn: 1,
            line: ";2 + 2".into(),
            ack: None,
        });
        let lines = sessions.lines_for(1);
        assert_eq!(lines.last().unwrap(), "{1, 4}");

        scheduler.handle_event(SchedulerEvent::Line {
            conn: 1,
            line: ";1/0".into(),
            ack: None,
        });
        let lines = sessions.lines_for(1);
        assert!(lines.last().unwrap().starts_with("{2, {E_DIV, "));

        // Unknown code is a compile failure: {0, {message}}.
        scheduler.handle_event(SchedulerEvent::Line {
            conn: 1,
            line: ";gibberish".into(),
            ack: None,
        });
        let lines = sessions.lines_for(1);
        assert!(lines.last().unwrap().starts_with("{0, {"));
    }

    #[test]
    fn fork_parks_child_until_deadline() {
        let (mut world, player) = test_world();
        // waitsend: fork t (1) notify(player, "hi"); endfork return t;
        let mut b = AstBuilder::new();
        let t = b.name("t");
        let fork_body = b.nested(|b| {
            let player_slot = b.names.find_name("player").unwrap();
            b.expr_stmt(builtin("notify", vec![ident(player_slot), stre("hi")]));
        });
        b.push(StmtNode::Fork {
            id: Some(t),
            time: int(1),
            body: fork_body,
        });
        b.ret(ident(t));
        install_compiled_verb(&mut world, &player, "waitsend", command_spec(), b.parse());

        let (mut scheduler, sessions) = scheduler_with(world, Arc::new(TestParser::new()));
        scheduler.handle_event(SchedulerEvent::Connected { conn: 1 });
        scheduler.handle_event(SchedulerEvent::Line {
            conn: 1,
            line: "connect tester".into(),
            ack: None,
        });
        scheduler.handle_event(SchedulerEvent::Line {
            conn: 1,
            line: "waitsend".into(),
            ack: None,
        });

        // The child is parked with a deadline about a second out; no "hi" yet.
        assert_eq!(scheduler.tasks.len(), 1);
        let child = scheduler.tasks.values().next().unwrap();
        assert_eq!(child.state, TaskState::Suspended);
        assert!(child.wake_at.is_some());
        assert!(!sessions.lines_for(1).iter().any(|l| l == "hi"));

        // Force the deadline and let the loop body run it.
        let id = child.task_id;
        scheduler.tasks.get_mut(&id).unwrap().wake_at = Some(Instant::now());
        scheduler.waiting.clear();
        scheduler.waiting.push(Reverse((Instant::now(), 0, id)));
        scheduler.wake_due_tasks();
        scheduler.run_ready_now();
        assert!(sessions.lines_for(1).iter().any(|l| l == "hi"));
    }

    #[test]
    fn suspend_and_resume_round_trip() {
        let (mut world, player) = test_world();
        // nap: x = suspend(); notify(player, tostr("woke:", x));
        let mut b = AstBuilder::new();
        let x = b.name("x");
        let player_slot = b.names.find_name("player").unwrap();
        b.assign("x", builtin("suspend", vec![]));
        b.expr_stmt(builtin(
            "notify",
            vec![
                ident(player_slot),
                builtin("tostr", vec![stre("woke:"), ident(x)]),
            ],
        ));
        b.ret0();
        install_compiled_verb(&mut world, &player, "nap", command_spec(), b.parse());

        let (mut scheduler, sessions) = scheduler_with(world, Arc::new(TestParser::new()));
        scheduler.handle_event(SchedulerEvent::Connected { conn: 1 });
        scheduler.handle_event(SchedulerEvent::Line {
            conn: 1,
            line: "connect tester".into(),
            ack: None,
        });
        scheduler.handle_event(SchedulerEvent::Line {
            conn: 1,
            line: "nap".into(),
            ack: None,
        });

        // Parked indefinitely.
        assert_eq!(scheduler.tasks.len(), 1);
        let id = *scheduler.tasks.keys().next().unwrap();
        assert_eq!(scheduler.tasks[&id].state, TaskState::Suspended);
        assert!(scheduler.tasks[&id].wake_at.is_none());

        // Resume it with a value, as resume() would.
        {
            let mut view = ControlView {
                tasks: &mut scheduler.tasks,
                ready: &mut scheduler.ready,
                connections: &scheduler.connections,
                player_conns: &scheduler.player_conns,
                boot_requests: &mut scheduler.boot_requests,
                shutdown: &mut scheduler.shutdown,
                checkpoint_requested: &mut scheduler.checkpoint_requested,
            };
            view.resume_task(id, v_int(42), player, true).unwrap();
        }
        scheduler.run_ready_now();
        let lines = sessions.lines_for(1);
        assert!(lines.iter().any(|l| l == "woke:42"));
    }

    #[test]
    fn kill_task_prevents_execution() {
        let (mut world, player) = test_world();
        let mut b = AstBuilder::new();
        let player_slot = b.names.find_name("player").unwrap();
        let fork_body = b.nested(|b| {
            let player_slot = b.names.find_name("player").unwrap();
            b.expr_stmt(builtin("notify", vec![ident(player_slot), stre("boom")]));
        });
        b.push(StmtNode::Fork {
            id: None,
            time: int(0),
            body: fork_body,
        });
        b.expr_stmt(builtin("notify", vec![ident(player_slot), stre("armed")]));
        b.ret0();
        install_compiled_verb(&mut world, &player, "arm", command_spec(), b.parse());

        let (mut scheduler, sessions) = scheduler_with(world, Arc::new(TestParser::new()));
        scheduler.handle_event(SchedulerEvent::Connected { conn: 1 });
        scheduler.handle_event(SchedulerEvent::Line {
            conn: 1,
            line: "connect tester".into(),
            ack: None,
        });
        scheduler.handle_event(SchedulerEvent::Line {
            conn: 1,
            line: "arm".into(),
            ack: None,
        });
        assert!(sessions.lines_for(1).iter().any(|l| l == "armed"));

        let id = *scheduler.tasks.keys().next().unwrap();
        {
            let mut view = ControlView {
                tasks: &mut scheduler.tasks,
                ready: &mut scheduler.ready,
                connections: &scheduler.connections,
                player_conns: &scheduler.player_conns,
                boot_requests: &mut scheduler.boot_requests,
                shutdown: &mut scheduler.shutdown,
                checkpoint_requested: &mut scheduler.checkpoint_requested,
            };
            view.kill_task(id, player, true).unwrap();
        }
        scheduler.wake_due_tasks();
        scheduler.run_ready_now();
        // After kill_task(t), no further opcode of t executes.
        assert!(!sessions.lines_for(1).iter().any(|l| l == "boom"));
    }

    #[test]
    fn checkpoint_round_trips_world_and_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("barn.db");

        let (mut world, player) = test_world();
        let mut b = AstBuilder::new();
        b.expr_stmt(builtin("suspend", vec![]));
        b.ret0();
        install_compiled_verb(&mut world, &player, "nap", command_spec(), b.parse());

        let sessions = Arc::new(BufferedSessions::new());
        let config = Config {
            checkpoint_path: Some(path.clone()),
            ..Config::default()
        };
        let (mut scheduler, _client) = Scheduler::new(
            world,
            Arc::new(TestParser::new()),
            Arc::new(config.clone()),
            sessions.clone(),
        );
        scheduler.handle_event(SchedulerEvent::Connected { conn: 1 });
        scheduler.handle_event(SchedulerEvent::Line {
            conn: 1,
            line: "connect tester".into(),
            ack: None,
        });
        scheduler.handle_event(SchedulerEvent::Line {
            conn: 1,
            line: "nap".into(),
            ack: None,
        });
        assert_eq!(scheduler.tasks.len(), 1);
        scheduler.checkpoint();

        // Restore into a fresh scheduler: the world and the parked task
        // both come back.
        let snapshot = barn_db::read_snapshot(&path).unwrap();
        let (world, blob) = snapshot.restore();
        assert!(world.valid(&player));
        let (mut restored, _client) = Scheduler::new(
            world,
            Arc::new(TestParser::new()),
            Arc::new(config),
            Arc::new(BufferedSessions::new()),
        );
        restored.restore_tasks(&blob);
        assert_eq!(restored.tasks.len(), 1);
        let task = restored.tasks.values().next().unwrap();
        assert_eq!(task.state, TaskState::Suspended);
        assert_eq!(task.player, player);
    }

    #[test]
    fn read_parks_until_the_next_line() {
        let (mut world, player) = test_world();
        // ask: answer = read(); notify(player, tostr("got ", answer));
        let mut b = AstBuilder::new();
        let answer = b.name("answer");
        let player_slot = b.names.find_name("player").unwrap();
        b.assign("answer", builtin("read", vec![]));
        b.expr_stmt(builtin(
            "notify",
            vec![
                ident(player_slot),
                builtin("tostr", vec![stre("got "), ident(answer)]),
            ],
        ));
        b.ret0();
        install_compiled_verb(&mut world, &player, "ask", command_spec(), b.parse());

        let (mut scheduler, sessions) = scheduler_with(world, Arc::new(TestParser::new()));
        scheduler.handle_event(SchedulerEvent::Connected { conn: 1 });
        scheduler.handle_event(SchedulerEvent::Line {
            conn: 1,
            line: "connect tester".into(),
            ack: None,
        });
        scheduler.handle_event(SchedulerEvent::Line {
            conn: 1,
            line: "ask".into(),
            ack: None,
        });
        // The task is parked on input; the next line feeds it instead of
        // becoming a command.
        assert_eq!(scheduler.input_waiters.get(&1).copied().is_some(), true);
        scheduler.handle_event(SchedulerEvent::Line {
            conn: 1,
            line: "forty-two".into(),
            ack: None,
        });
        let lines = sessions.lines_for(1);
        assert!(lines.iter().any(|l| l == "got forty-two"));
        assert!(scheduler.input_waiters.is_empty());
    }

    #[test]
    fn empty_line_produces_nothing() {
        let (world, _) = test_world();
        let (mut scheduler, sessions) = scheduler_with(world, Arc::new(TestParser::new()));
        scheduler.handle_event(SchedulerEvent::Connected { conn: 1 });
        scheduler.handle_event(SchedulerEvent::Line {
            conn: 1,
            line: "connect x".into(),
            ack: None,
        });
        let before = sessions.lines_for(1).len();
        scheduler.handle_event(SchedulerEvent::Line {
            conn: 1,
            line: "   ".into(),
            ack: None,
        });
        assert_eq!(sessions.lines_for(1).len(), before);
    }

    #[test]
    fn queued_tasks_reports_parked_forks() {
        let (mut world, player) = test_world();
        let mut b = AstBuilder::new();
        let fork_body = b.nested(|b| {
            b.expr_stmt(int(1));
        });
        b.push(StmtNode::Fork {
            id: None,
            time: int(60),
            body: fork_body,
        });
        b.ret(v_empty_list_expr());
        install_compiled_verb(&mut world, &player, "later", command_spec(), b.parse());

        let (mut scheduler, _sessions) = scheduler_with(world, Arc::new(TestParser::new()));
        scheduler.handle_event(SchedulerEvent::Connected { conn: 1 });
        scheduler.handle_event(SchedulerEvent::Line {
            conn: 1,
            line: "connect x".into(),
            ack: None,
        });
        scheduler.handle_event(SchedulerEvent::Line {
            conn: 1,
            line: "later".into(),
            ack: None,
        });
        let view = ControlView {
            tasks: &mut scheduler.tasks,
            ready: &mut scheduler.ready,
            connections: &scheduler.connections,
            player_conns: &scheduler.player_conns,
            boot_requests: &mut scheduler.boot_requests,
            shutdown: &mut scheduler.shutdown,
            checkpoint_requested: &mut scheduler.checkpoint_requested,
        };
        let tasks = view.queued_tasks();
        assert_eq!(tasks.len(), 1);
        let wake_in = tasks[0].wake_in.unwrap();
        assert!(wake_in > 55.0 && wake_in <= 60.5);
    }

    fn v_empty_list_expr() -> barn_compiler::ast::Expr {
        value(v_empty_list())
    }
}
