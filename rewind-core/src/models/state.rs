use std::fmt;

/// Capture lifecycle.
///
/// ```text
///            start_listening              start_recording
///   Idle ─────────────────────→ Listening ───────────────→ Recording
///    ↑  ←─────────────────────      ↑    ←───────────────     │
///    │       stop_listening         │     stop_recording      │
///    └──────────────────────────────┴─────────────────────────┘
///          stop_recording (listening not explicitly enabled)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LifecycleState {
    #[default]
    Idle,
    Listening,
    Recording,
}

impl LifecycleState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }

    /// Whether the capture source is open and the ring buffer is filling.
    pub fn is_capturing(&self) -> bool {
        !self.is_idle()
    }

    /// The single transition table for every externally issued command.
    pub fn on(self, command: Command) -> Transition {
        use Command::*;
        use LifecycleState::*;

        match (self, command) {
            (Idle, StartListening) => Transition::Enter(Listening),
            (Idle, StartRecording) => Transition::Enter(Recording),
            (Idle, Reconfigure) => Transition::Enter(Idle),
            (Idle, StopListening | StopRecording) => Transition::Ignore,
            (Idle, DumpSnapshot) => Transition::Reject,

            (Listening, StopListening) => Transition::Enter(Idle),
            (Listening, StartRecording) => Transition::Enter(Recording),
            (Listening, DumpSnapshot) => Transition::Enter(Listening),
            (Listening, Reconfigure) => Transition::Enter(Listening),
            (Listening, StartListening | StopRecording) => Transition::Ignore,

            (Recording, StopRecording) => Transition::Enter(Listening),
            (Recording, DumpSnapshot) => Transition::Enter(Recording),
            (Recording, StartListening | StartRecording) => Transition::Ignore,
            (Recording, StopListening | Reconfigure) => Transition::Reject,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Recording => "recording",
        };
        f.write_str(name)
    }
}

/// Commands that are subject to the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    StartListening,
    StopListening,
    StartRecording,
    StopRecording,
    DumpSnapshot,
    Reconfigure,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StartListening => "start listening",
            Self::StopListening => "stop listening",
            Self::StartRecording => "start recording",
            Self::StopRecording => "stop recording",
            Self::DumpSnapshot => "dump snapshot",
            Self::Reconfigure => "reconfigure",
        };
        f.write_str(name)
    }
}

/// Outcome of looking a command up in the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Run the command; the engine ends up in the given state on success.
    Enter(LifecycleState),
    /// The command is a no-op in the current state.
    Ignore,
    /// The command is forbidden in the current state.
    Reject,
}

/// Read-only snapshot returned by `query_state`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EngineStatus {
    pub state: LifecycleState,
    pub listening_enabled: bool,
    pub recording: bool,
    pub memorized_seconds: f64,
    pub capacity_seconds: f64,
    pub recorded_seconds: f64,
}
