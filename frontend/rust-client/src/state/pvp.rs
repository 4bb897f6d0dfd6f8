use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::countdown::{Countdown, Tick};
use super::notice::Notice;
use crate::config::Config;
use crate::error::ClientError;
use crate::metrics;
use crate::models::codebattle::Difficulty;
use crate::models::pvp::{
    ClientEvent, MatchInfo, MatchResult, OpponentProgress, PvpSubmitResult, ServerEvent,
};
use crate::models::timer::TimerEvent;
use crate::realtime::{Incoming, SocketConnection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Open,
    Pending,
    Solved,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PvpPlaying {
    pub info: MatchInfo,
    pub language: String,
    pub code: String,
    pub countdown: Countdown,
    pub submission: Submission,
    pub last_result: Option<PvpSubmitResult>,
    pub opponent: OpponentProgress,
    pub leave_prompt: bool,
    pub time_up: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Won,
    Lost,
    Draw,
    Unknown,
}

impl MatchOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchOutcome::Won => "won",
            MatchOutcome::Lost => "lost",
            MatchOutcome::Draw => "draw",
            MatchOutcome::Unknown => "unknown",
        }
    }

    fn resolve(result: &MatchResult, info: &MatchInfo, user_id: Option<i64>) -> Self {
        if result.is_draw {
            return MatchOutcome::Draw;
        }
        match (result.winner_id, user_id) {
            (Some(winner), Some(me)) if winner == me => MatchOutcome::Won,
            (Some(winner), _) if winner == info.opponent.user_id => MatchOutcome::Lost,
            (Some(_), Some(_)) => MatchOutcome::Lost,
            _ => MatchOutcome::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PvpFinished {
    pub info: MatchInfo,
    pub result: MatchResult,
    pub outcome: MatchOutcome,
}

/// Client view of a 1v1 match: `idle -> searching -> found -> playing -> finished`.
#[derive(Debug, Clone, PartialEq)]
pub enum PvpState {
    Idle,
    Searching {
        language: String,
        difficulty: Option<Difficulty>,
        room_code: Option<String>,
        queue_size: Option<u32>,
    },
    Found {
        info: MatchInfo,
        language: String,
        leave_prompt: bool,
    },
    Playing(Box<PvpPlaying>),
    Finished(Box<PvpFinished>),
}

impl PvpState {
    pub fn name(&self) -> &'static str {
        match self {
            PvpState::Idle => "idle",
            PvpState::Searching { .. } => "searching",
            PvpState::Found { .. } => "found",
            PvpState::Playing(_) => "playing",
            PvpState::Finished(_) => "finished",
        }
    }

    /// Match id while a match is found or in progress.
    pub fn match_id(&self) -> Option<&str> {
        match self {
            PvpState::Found { info, .. } => Some(&info.match_id),
            PvpState::Playing(p) => Some(&p.info.match_id),
            PvpState::Finished(f) => Some(&f.info.match_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PvpInput {
    FindMatch {
        language: String,
        difficulty: Option<Difficulty>,
    },
    CancelSearch,
    CreateRoom {
        language: String,
        difficulty: Option<Difficulty>,
    },
    JoinRoom {
        room_code: String,
        language: String,
    },
    EditCode(String),
    Submit,
    RequestLeave,
    ConfirmLeave,
    DismissLeave,
    Server(ServerEvent),
    StartDelayElapsed { match_id: String },
    Tick,
    Disconnected(String),
    Reset,
}

impl PvpInput {
    /// User actions that can only be carried out over a live socket.
    pub fn needs_socket(&self) -> bool {
        matches!(
            self,
            PvpInput::FindMatch { .. }
                | PvpInput::CancelSearch
                | PvpInput::CreateRoom { .. }
                | PvpInput::JoinRoom { .. }
                | PvpInput::Submit
                | PvpInput::ConfirmLeave
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PvpEffect {
    Emit(ClientEvent),
    ScheduleStart { match_id: String },
    Notify(Notice),
    Timer(TimerEvent),
}

#[derive(Debug, Clone)]
pub struct PvpMachine {
    state: PvpState,
    user_id: Option<i64>,
}

impl PvpMachine {
    pub fn new(user_id: Option<i64>) -> Self {
        Self {
            state: PvpState::Idle,
            user_id,
        }
    }

    pub fn state(&self) -> &PvpState {
        &self.state
    }

    /// Puts back a state whose outgoing event never left the client.
    pub fn restore(&mut self, state: PvpState) {
        tracing::debug!("Restoring {} after a failed emit", state.name());
        self.state = state;
    }

    pub fn apply(&mut self, input: PvpInput) -> Vec<PvpEffect> {
        let state = std::mem::replace(&mut self.state, PvpState::Idle);
        let (next, effects) = self.step(state, input);
        self.state = next;
        effects
    }

    fn step(&self, state: PvpState, input: PvpInput) -> (PvpState, Vec<PvpEffect>) {
        use PvpEffect::{Emit, Notify};

        match (state, input) {
            // Starting a search
            (
                PvpState::Idle | PvpState::Finished(_),
                PvpInput::FindMatch {
                    language,
                    difficulty,
                },
            ) => {
                tracing::info!("Searching for a match: language={}", language);
                let emit = Emit(ClientEvent::FindMatch {
                    language: language.clone(),
                    difficulty,
                });
                (
                    PvpState::Searching {
                        language,
                        difficulty,
                        room_code: None,
                        queue_size: None,
                    },
                    vec![emit],
                )
            }
            (
                PvpState::Idle | PvpState::Finished(_),
                PvpInput::CreateRoom {
                    language,
                    difficulty,
                },
            ) => {
                let emit = Emit(ClientEvent::CreateRoom {
                    language: language.clone(),
                    difficulty,
                });
                (
                    PvpState::Searching {
                        language,
                        difficulty,
                        room_code: None,
                        queue_size: None,
                    },
                    vec![emit],
                )
            }
            (
                state @ (PvpState::Idle | PvpState::Finished(_)),
                PvpInput::JoinRoom {
                    room_code,
                    language,
                },
            ) => {
                let room_code = room_code.trim().to_uppercase();
                if room_code.is_empty() {
                    return (state, vec![Notify(Notice::error("Enter a room code"))]);
                }
                let emit = Emit(ClientEvent::JoinRoom {
                    room_code: room_code.clone(),
                    language: language.clone(),
                });
                (
                    PvpState::Searching {
                        language,
                        difficulty: None,
                        room_code: Some(room_code),
                        queue_size: None,
                    },
                    vec![emit],
                )
            }

            // Searching
            (PvpState::Searching { .. }, PvpInput::CancelSearch) => {
                tracing::info!("Search cancelled");
                (PvpState::Idle, vec![Emit(ClientEvent::CancelSearch)])
            }
            (
                PvpState::Searching {
                    language,
                    difficulty,
                    room_code,
                    ..
                },
                PvpInput::Server(ServerEvent::Searching { queue_size }),
            ) => (
                PvpState::Searching {
                    language,
                    difficulty,
                    room_code,
                    queue_size,
                },
                vec![],
            ),
            (
                PvpState::Searching {
                    language,
                    difficulty,
                    queue_size,
                    ..
                },
                PvpInput::Server(ServerEvent::RoomCreated { room_code }),
            ) => {
                let notice = Notify(Notice::info(format!("Room created: {}", room_code)));
                (
                    PvpState::Searching {
                        language,
                        difficulty,
                        room_code: Some(room_code),
                        queue_size,
                    },
                    vec![notice],
                )
            }
            (PvpState::Searching { language, .. }, PvpInput::Server(ServerEvent::MatchFound(info))) => {
                tracing::info!(
                    "Match found: id={}, opponent={}",
                    info.match_id,
                    info.opponent.username
                );
                let effects = vec![
                    PvpEffect::ScheduleStart {
                        match_id: info.match_id.clone(),
                    },
                    Notify(Notice::success(format!(
                        "Opponent found: {}",
                        info.opponent.username
                    ))),
                ];
                (
                    PvpState::Found {
                        info,
                        language,
                        leave_prompt: false,
                    },
                    effects,
                )
            }
            (PvpState::Searching { .. }, PvpInput::Server(ServerEvent::Error { message })) => {
                tracing::warn!("Search failed: {}", message);
                (PvpState::Idle, vec![Notify(Notice::error(message))])
            }

            // A match we no longer want
            (PvpState::Idle, PvpInput::Server(ServerEvent::MatchFound(info))) => {
                tracing::info!("Leaving match {} found after cancel", info.match_id);
                (
                    PvpState::Idle,
                    vec![Emit(ClientEvent::LeaveMatch {
                        match_id: Some(info.match_id),
                    })],
                )
            }

            // Found
            (
                PvpState::Found {
                    info,
                    language,
                    leave_prompt,
                },
                PvpInput::StartDelayElapsed { match_id },
            ) => {
                if match_id != info.match_id {
                    tracing::debug!("Stale start timer for match {}", match_id);
                    return (
                        PvpState::Found {
                            info,
                            language,
                            leave_prompt,
                        },
                        vec![],
                    );
                }
                let countdown = Countdown::new(info.time_limit_secs());
                let tick = countdown.tick_event();
                let code = info.task.starter_for(&language);
                tracing::info!(
                    "Match {} started, time_limit={}s",
                    info.match_id,
                    countdown.total()
                );
                (
                    PvpState::Playing(Box::new(PvpPlaying {
                        info,
                        language,
                        code,
                        countdown,
                        submission: Submission::Open,
                        last_result: None,
                        opponent: OpponentProgress::default(),
                        leave_prompt,
                        time_up: false,
                    })),
                    vec![PvpEffect::Timer(tick)],
                )
            }

            // Playing
            (PvpState::Playing(mut p), PvpInput::Tick) => {
                let effects = match p.countdown.tick() {
                    Tick::Running(_) => vec![PvpEffect::Timer(p.countdown.tick_event())],
                    Tick::Expired => {
                        p.time_up = true;
                        vec![
                            PvpEffect::Timer(p.countdown.expired_event()),
                            Notify(Notice::info("Time is up")),
                        ]
                    }
                    Tick::Idle => vec![],
                };
                (PvpState::Playing(p), effects)
            }
            (PvpState::Playing(mut p), PvpInput::EditCode(code)) => {
                p.code = code;
                (PvpState::Playing(p), vec![])
            }
            (PvpState::Playing(mut p), PvpInput::Submit) => {
                let effects = match p.submission {
                    Submission::Open if p.code.trim().is_empty() => {
                        vec![Notify(Notice::error("Write some code first"))]
                    }
                    Submission::Open => {
                        p.submission = Submission::Pending;
                        vec![Emit(ClientEvent::SubmitCode {
                            match_id: p.info.match_id.clone(),
                            code: p.code.clone(),
                            language: p.language.clone(),
                        })]
                    }
                    Submission::Pending | Submission::Solved => vec![],
                };
                (PvpState::Playing(p), effects)
            }
            (PvpState::Playing(mut p), PvpInput::Server(ServerEvent::SubmitResult(result))) => {
                let notice = if result.solved {
                    p.submission = Submission::Solved;
                    Notice::success("All tests passed, waiting for the result")
                } else {
                    p.submission = Submission::Open;
                    match &result.error {
                        Some(error) => Notice::error(error.clone()),
                        None => Notice::info(format!(
                            "{}/{} tests passed",
                            result.tests_passed, result.tests_total
                        )),
                    }
                };
                p.last_result = Some(result);
                (PvpState::Playing(p), vec![Notify(notice)])
            }
            (PvpState::Playing(mut p), PvpInput::Server(ServerEvent::OpponentSubmitted(progress))) => {
                let notice = Notice::info(format!("{} submitted a solution", p.info.opponent.username));
                p.opponent = progress;
                (PvpState::Playing(p), vec![Notify(notice)])
            }
            (PvpState::Playing(mut p), PvpInput::Server(ServerEvent::Error { message })) => {
                if p.submission == Submission::Pending {
                    p.submission = Submission::Open;
                }
                (PvpState::Playing(p), vec![Notify(Notice::error(message))])
            }

            // Ending a match
            (state @ (PvpState::Found { .. } | PvpState::Playing(_)), PvpInput::Server(ServerEvent::MatchFinished(result))) => {
                if !Self::is_current(&state, result.match_id.as_deref()) {
                    return (state, vec![]);
                }
                match state {
                    PvpState::Found { info, .. } => self.finish(info, result),
                    PvpState::Playing(p) => self.finish(p.info, result),
                    other => (other, vec![]),
                }
            }
            (state @ (PvpState::Found { .. } | PvpState::Playing(_)), PvpInput::Server(ServerEvent::OpponentLeft { match_id })) => {
                if !Self::is_current(&state, match_id.as_deref()) {
                    return (state, vec![]);
                }
                tracing::info!("Opponent left match {:?}", state.match_id());
                metrics::record_session_outcome("pvp", "opponent_left");
                (
                    PvpState::Idle,
                    vec![Notify(Notice::info("Your opponent left the match"))],
                )
            }

            // Leaving
            (PvpState::Found { info, language, .. }, PvpInput::RequestLeave) => (
                PvpState::Found {
                    info,
                    language,
                    leave_prompt: true,
                },
                vec![],
            ),
            (PvpState::Playing(mut p), PvpInput::RequestLeave) => {
                p.leave_prompt = true;
                (PvpState::Playing(p), vec![])
            }
            (PvpState::Found { info, language, .. }, PvpInput::DismissLeave) => (
                PvpState::Found {
                    info,
                    language,
                    leave_prompt: false,
                },
                vec![],
            ),
            (PvpState::Playing(mut p), PvpInput::DismissLeave) => {
                p.leave_prompt = false;
                (PvpState::Playing(p), vec![])
            }
            (
                PvpState::Found {
                    info,
                    leave_prompt: true,
                    ..
                },
                PvpInput::ConfirmLeave,
            ) => Self::leave(info.match_id),
            (PvpState::Playing(p), PvpInput::ConfirmLeave) if p.leave_prompt => {
                Self::leave(p.info.match_id)
            }

            // Connection and reset
            (state @ (PvpState::Idle | PvpState::Finished(_)), PvpInput::Disconnected(reason)) => {
                tracing::info!("Socket closed while {}: {}", state.name(), reason);
                (state, vec![])
            }
            (state, PvpInput::Disconnected(reason)) => {
                tracing::warn!("Socket closed while {}: {}", state.name(), reason);
                let err = ClientError::Socket(reason);
                (PvpState::Idle, vec![Notify(Notice::from(&err))])
            }
            (PvpState::Finished(_), PvpInput::Reset) => (PvpState::Idle, vec![]),
            (state, PvpInput::Server(ServerEvent::Error { message })) => {
                (state, vec![Notify(Notice::error(message))])
            }

            (state, input) => {
                tracing::debug!("Ignoring {:?} while {}", input, state.name());
                (state, vec![])
            }
        }
    }

    fn is_current(state: &PvpState, match_id: Option<&str>) -> bool {
        match (state.match_id(), match_id) {
            (Some(current), Some(incoming)) if current != incoming => {
                tracing::debug!("Ignoring event for match {} while in {}", incoming, current);
                false
            }
            _ => true,
        }
    }

    fn leave(match_id: String) -> (PvpState, Vec<PvpEffect>) {
        tracing::info!("Leaving match {}", match_id);
        metrics::record_session_outcome("pvp", "left");
        (
            PvpState::Idle,
            vec![PvpEffect::Emit(ClientEvent::LeaveMatch {
                match_id: Some(match_id),
            })],
        )
    }

    fn finish(&self, info: MatchInfo, result: MatchResult) -> (PvpState, Vec<PvpEffect>) {
        let outcome = MatchOutcome::resolve(&result, &info, self.user_id);
        metrics::record_session_outcome("pvp", outcome.as_str());
        tracing::info!("Match {} finished: {}", info.match_id, outcome.as_str());

        let notice = match outcome {
            MatchOutcome::Won => Notice::success("You won!"),
            MatchOutcome::Lost => Notice::info("You lost this one"),
            MatchOutcome::Draw => Notice::info("It's a draw"),
            MatchOutcome::Unknown => Notice::info("Match finished"),
        };

        (
            PvpState::Finished(Box::new(PvpFinished {
                info,
                result,
                outcome,
            })),
            vec![PvpEffect::Notify(notice)],
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PvpUpdate {
    Notice(Notice),
    Timer(TimerEvent),
}

/// Handle to a running [`PvpController`]. Dropping it closes the socket.
pub struct PvpHandle {
    commands: mpsc::Sender<PvpInput>,
    pub state: watch::Receiver<PvpState>,
    pub updates: mpsc::UnboundedReceiver<PvpUpdate>,
    task: JoinHandle<()>,
}

impl PvpHandle {
    pub async fn send(&self, input: PvpInput) -> Result<(), ClientError> {
        self.commands
            .send(input)
            .await
            .map_err(|_| ClientError::InvalidTransition("the match is closed"))
    }

    pub fn current(&self) -> PvpState {
        self.state.borrow().clone()
    }

    pub async fn wait_for<F>(&mut self, mut predicate: F) -> Result<PvpState, ClientError>
    where
        F: FnMut(&PvpState) -> bool,
    {
        self.state
            .wait_for(|state| predicate(state))
            .await
            .map(|state| state.clone())
            .map_err(|_| ClientError::InvalidTransition("the match is closed"))
    }
}

impl Drop for PvpHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Owns the socket and the [`PvpMachine`] for one match session.
pub struct PvpController {
    socket: SocketConnection,
    machine: PvpMachine,
    start_delay: Duration,
    pending_start: Option<(Instant, String)>,
    connected: bool,
    state_tx: watch::Sender<PvpState>,
    updates_tx: mpsc::UnboundedSender<PvpUpdate>,
}

impl PvpController {
    pub fn spawn(socket: SocketConnection, config: &Config, user_id: Option<i64>) -> PvpHandle {
        let (commands_tx, commands_rx) = mpsc::channel(32);
        let (state_tx, state_rx) = watch::channel(PvpState::Idle);
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();

        let controller = PvpController {
            socket,
            machine: PvpMachine::new(user_id),
            start_delay: config.pvp_start_delay(),
            pending_start: None,
            connected: true,
            state_tx,
            updates_tx,
        };

        let task = tokio::spawn(controller.run(commands_rx));

        PvpHandle {
            commands: commands_tx,
            state: state_rx,
            updates: updates_rx,
            task,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<PvpInput>) {
        let second = Duration::from_secs(1);
        let mut ticker = interval_at(Instant::now() + second, second);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let start_at = self.pending_start.as_ref().map(|(at, _)| *at);

            let input = tokio::select! {
                command = commands.recv() => match command {
                    Some(input) => input,
                    None => break,
                },
                incoming = self.socket.next_event(), if self.connected => match incoming {
                    Some(Incoming::Event(event)) => PvpInput::Server(event),
                    Some(Incoming::Closed(reason)) => {
                        self.connected = false;
                        PvpInput::Disconnected(reason)
                    }
                    None => {
                        self.connected = false;
                        PvpInput::Disconnected("connection lost".to_string())
                    }
                },
                _ = sleep_until_opt(start_at) => match self.pending_start.take() {
                    Some((_, match_id)) => PvpInput::StartDelayElapsed { match_id },
                    None => continue,
                },
                _ = ticker.tick() => PvpInput::Tick,
            };

            if !self.connected && input.needs_socket() {
                tracing::warn!("Refusing {:?}, the game server connection is closed", input);
                self.notify_offline();
                continue;
            }

            let previous = self.machine.state().clone();
            let was_playing = matches!(previous, PvpState::Playing(_));
            let effects = self.machine.apply(input);

            for effect in effects {
                if let Err(e) = self.execute(effect) {
                    tracing::error!("Emit failed, staying {}: {}", previous.name(), e);
                    self.connected = false;
                    self.machine.restore(previous);
                    let _ = self.updates_tx.send(PvpUpdate::Notice(Notice::from(&e)));
                    break;
                }
            }

            if !was_playing && matches!(self.machine.state(), PvpState::Playing(_)) {
                ticker.reset();
            }
            if !matches!(self.machine.state(), PvpState::Found { .. }) {
                self.pending_start = None;
            }
            self.state_tx.send_replace(self.machine.state().clone());
        }

        self.socket.close();
        tracing::debug!("PvP controller stopped");
    }

    fn notify_offline(&self) {
        let err = ClientError::Socket("connection closed".to_string());
        let _ = self.updates_tx.send(PvpUpdate::Notice(Notice::from(&err)));
    }

    fn execute(&mut self, effect: PvpEffect) -> Result<(), ClientError> {
        match effect {
            PvpEffect::Emit(event) => {
                self.socket.emit(&event)?;
            }
            PvpEffect::ScheduleStart { match_id } => {
                self.pending_start = Some((Instant::now() + self.start_delay, match_id));
            }
            PvpEffect::Notify(notice) => {
                let _ = self.updates_tx.send(PvpUpdate::Notice(notice));
            }
            PvpEffect::Timer(event) => {
                let _ = self.updates_tx.send(PvpUpdate::Timer(event));
            }
        }
        Ok(())
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::codebattle::GameTask;
    use crate::models::pvp::Opponent;
    use std::collections::HashMap;

    fn match_info(id: &str, difficulty: Difficulty) -> MatchInfo {
        MatchInfo {
            match_id: id.to_string(),
            opponent: Opponent {
                user_id: 2,
                username: "rival".to_string(),
                rating: Some(1300),
            },
            task: GameTask {
                id: 5,
                title: "Palindrome".to_string(),
                description: String::new(),
                difficulty,
                languages: vec!["javascript".to_string()],
                test_cases: vec![],
                starter_code: HashMap::new(),
                category: None,
                points: None,
            },
            time_limit: None,
            started_at: None,
        }
    }

    fn find() -> PvpInput {
        PvpInput::FindMatch {
            language: "javascript".to_string(),
            difficulty: None,
        }
    }

    fn playing_machine(id: &str, difficulty: Difficulty) -> PvpMachine {
        let mut machine = PvpMachine::new(Some(1));
        machine.apply(find());
        machine.apply(PvpInput::Server(ServerEvent::MatchFound(match_info(id, difficulty))));
        machine.apply(PvpInput::StartDelayElapsed {
            match_id: id.to_string(),
        });
        machine
    }

    fn emitted(effects: &[PvpEffect]) -> Vec<&'static str> {
        effects
            .iter()
            .filter_map(|e| match e {
                PvpEffect::Emit(event) => Some(event.name()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut machine = PvpMachine::new(Some(1));
        assert_eq!(emitted(&machine.apply(find())), vec!["find-match"]);
        assert_eq!(machine.state().name(), "searching");

        let effects = machine.apply(PvpInput::Server(ServerEvent::MatchFound(match_info(
            "m1",
            Difficulty::Medium,
        ))));
        assert!(effects.contains(&PvpEffect::ScheduleStart {
            match_id: "m1".to_string()
        }));
        assert_eq!(machine.state().name(), "found");

        machine.apply(PvpInput::StartDelayElapsed {
            match_id: "m1".to_string(),
        });
        match machine.state() {
            PvpState::Playing(p) => assert_eq!(p.countdown.total(), 300),
            other => panic!("expected playing, got {}", other.name()),
        }

        machine.apply(PvpInput::Server(ServerEvent::MatchFinished(MatchResult {
            match_id: Some("m1".to_string()),
            winner_id: Some(1),
            is_draw: false,
            rating_change: Some(16),
            new_rating: Some(1216),
            reason: None,
        })));
        match machine.state() {
            PvpState::Finished(f) => assert_eq!(f.outcome, MatchOutcome::Won),
            other => panic!("expected finished, got {}", other.name()),
        }
    }

    #[test]
    fn test_match_time_limit_follows_difficulty() {
        for (difficulty, secs) in [
            (Difficulty::Easy, 180),
            (Difficulty::Medium, 300),
            (Difficulty::Hard, 600),
        ] {
            let machine = playing_machine("m", difficulty);
            match machine.state() {
                PvpState::Playing(p) => assert_eq!(p.countdown.total(), secs),
                other => panic!("expected playing, got {}", other.name()),
            }
        }
    }

    #[test]
    fn test_stale_start_timer_is_ignored() {
        let mut machine = PvpMachine::new(None);
        machine.apply(find());
        machine.apply(PvpInput::Server(ServerEvent::MatchFound(match_info(
            "m2",
            Difficulty::Easy,
        ))));
        machine.apply(PvpInput::StartDelayElapsed {
            match_id: "m1".to_string(),
        });
        assert_eq!(machine.state().name(), "found");
    }

    #[test]
    fn test_match_finished_while_searching_is_ignored() {
        let mut machine = PvpMachine::new(Some(1));
        machine.apply(find());
        let effects = machine.apply(PvpInput::Server(ServerEvent::MatchFinished(MatchResult {
            match_id: None,
            winner_id: Some(1),
            is_draw: false,
            rating_change: None,
            new_rating: None,
            reason: None,
        })));
        assert!(effects.is_empty());
        assert_eq!(machine.state().name(), "searching");
    }

    #[test]
    fn test_late_match_found_after_cancel_leaves() {
        let mut machine = PvpMachine::new(Some(1));
        machine.apply(find());
        assert_eq!(emitted(&machine.apply(PvpInput::CancelSearch)), vec!["cancel-search"]);

        let effects = machine.apply(PvpInput::Server(ServerEvent::MatchFound(match_info(
            "m3",
            Difficulty::Easy,
        ))));
        assert_eq!(
            effects,
            vec![PvpEffect::Emit(ClientEvent::LeaveMatch {
                match_id: Some("m3".to_string())
            })]
        );
        assert_eq!(machine.state(), &PvpState::Idle);
    }

    #[test]
    fn test_leave_requires_confirmation() {
        let mut machine = playing_machine("m4", Difficulty::Easy);
        assert!(machine.apply(PvpInput::ConfirmLeave).is_empty());
        assert_eq!(machine.state().name(), "playing");

        machine.apply(PvpInput::RequestLeave);
        machine.apply(PvpInput::DismissLeave);
        assert!(machine.apply(PvpInput::ConfirmLeave).is_empty());

        machine.apply(PvpInput::RequestLeave);
        let effects = machine.apply(PvpInput::ConfirmLeave);
        assert_eq!(emitted(&effects), vec!["leave-match"]);
        assert_eq!(machine.state(), &PvpState::Idle);
    }

    #[test]
    fn test_opponent_left_returns_to_idle() {
        let mut machine = playing_machine("m5", Difficulty::Easy);
        // event for another match is ignored
        machine.apply(PvpInput::Server(ServerEvent::OpponentLeft {
            match_id: Some("other".to_string()),
        }));
        assert_eq!(machine.state().name(), "playing");

        let effects = machine.apply(PvpInput::Server(ServerEvent::OpponentLeft {
            match_id: Some("m5".to_string()),
        }));
        assert_eq!(machine.state(), &PvpState::Idle);
        assert!(matches!(&effects[0], PvpEffect::Notify(_)));
    }

    #[test]
    fn test_countdown_expiry_is_display_only() {
        let mut machine = playing_machine("m6", Difficulty::Easy);
        machine.apply(PvpInput::EditCode("return 1".to_string()));

        let mut all = Vec::new();
        for _ in 0..185 {
            all.extend(machine.apply(PvpInput::Tick));
        }
        assert!(emitted(&all).is_empty());
        let expired = all
            .iter()
            .filter(|e| matches!(e, PvpEffect::Timer(TimerEvent::TimeExpired(_))))
            .count();
        assert_eq!(expired, 1);
        match machine.state() {
            PvpState::Playing(p) => assert!(p.time_up),
            other => panic!("expected playing, got {}", other.name()),
        }
    }

    #[test]
    fn test_submit_is_single_flight() {
        let mut machine = playing_machine("m7", Difficulty::Easy);
        machine.apply(PvpInput::EditCode("return 1".to_string()));
        assert_eq!(emitted(&machine.apply(PvpInput::Submit)), vec!["submit-code"]);
        assert!(machine.apply(PvpInput::Submit).is_empty());

        machine.apply(PvpInput::Server(ServerEvent::SubmitResult(PvpSubmitResult {
            solved: false,
            tests_passed: 1,
            tests_total: 4,
            time_spent: None,
            error: None,
        })));
        assert_eq!(emitted(&machine.apply(PvpInput::Submit)), vec!["submit-code"]);
    }

    #[test]
    fn test_disconnect_mid_match_returns_to_idle() {
        let mut machine = playing_machine("m8", Difficulty::Hard);
        let effects = machine.apply(PvpInput::Disconnected("reset by peer".to_string()));
        assert_eq!(machine.state(), &PvpState::Idle);
        assert!(matches!(&effects[0], PvpEffect::Notify(n) if n.is_error()));
    }

    #[test]
    fn test_search_error_returns_to_idle() {
        let mut machine = PvpMachine::new(None);
        machine.apply(find());
        machine.apply(PvpInput::Server(ServerEvent::Error {
            message: "Queue is full".to_string(),
        }));
        assert_eq!(machine.state(), &PvpState::Idle);
    }

    #[test]
    fn test_outcome_without_user_id() {
        let info = match_info("m9", Difficulty::Easy);
        let lost = MatchResult {
            match_id: None,
            winner_id: Some(2),
            is_draw: false,
            rating_change: None,
            new_rating: None,
            reason: None,
        };
        assert_eq!(MatchOutcome::resolve(&lost, &info, None), MatchOutcome::Lost);

        let unknown = MatchResult {
            winner_id: Some(42),
            ..lost.clone()
        };
        assert_eq!(MatchOutcome::resolve(&unknown, &info, None), MatchOutcome::Unknown);
    }
}
