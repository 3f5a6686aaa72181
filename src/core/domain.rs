use std::fmt;

use uuid::Uuid;

/// Identifies one accepted run. Later submissions always get a larger value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug)]
pub struct Run {
    pub id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub generation: Option<Generation>,
    pub source: String,
    pub state: RunState,
}

impl Run {
    pub fn accept(source: &str, generation: Option<Generation>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: chrono::Utc::now(),
            generation,
            source: source.to_string(),
            state: RunState::default(),
        }
    }

    pub fn change_state(&self, new_state: RunState) -> Self {
        tracing::debug!(
            run_id = %self.id,
            generation = ?self.generation,
            "{:?} -> {:?}",
            self.state,
            new_state
        );
        Self {
            state: new_state,
            ..self.clone()
        }
    }

    pub fn elapsed_ms(&self) -> i64 {
        (chrono::Utc::now() - self.created_at).num_milliseconds()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RunState {
    #[default]
    Accepted,
    Running,
    Completed,
    Faulted,
}

/// Handle to a program compiled by an engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Program {
    pub id: Uuid,
}

/// Value produced by a finished program. Callers currently only care
/// whether execution succeeded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Value {
    #[default]
    Nil,
    Exit(i64),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Success { output: String },
    Failure { message: String, output: String },
}

impl RunOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self::Success {
            output: output.into(),
        }
    }

    pub fn failure(message: impl Into<String>, output: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
            output: output.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn output(&self) -> &str {
        match self {
            Self::Success { output } | Self::Failure { output, .. } => output,
        }
    }

    /// Shape handed to the host: `{success, output}` or
    /// `{success, message, output}`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Success { output } => serde_json::json!({
                "success": true,
                "output": output,
            }),
            Self::Failure { message, output } => serde_json::json!({
                "success": false,
                "message": message,
                "output": output,
            }),
        }
    }
}

/// Returned by `submit` before the run has finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ack {
    pub generation: Generation,
}

impl Ack {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "async": true })
    }
}
