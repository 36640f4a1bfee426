use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a judged submission.
///
/// Serialized as the integer code the coordinator protocol uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum JudgeStatus {
    SystemError,
    Waiting,
    Compiling,
    CompilationError,
    CompilationTimeLimitExceeded,
    Running,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    OutputLimitExceeded,
    RuntimeError,
    PresentationError,
    WrongAnswer,
    Accept,
    WaitingRunning,
}

impl JudgeStatus {
    /// Wire code of this status
    pub fn code(self) -> i8 {
        match self {
            JudgeStatus::SystemError => -1,
            JudgeStatus::Waiting => 0,
            JudgeStatus::Compiling => 1,
            JudgeStatus::CompilationError => 2,
            JudgeStatus::CompilationTimeLimitExceeded => 3,
            JudgeStatus::Running => 4,
            JudgeStatus::TimeLimitExceeded => 5,
            JudgeStatus::MemoryLimitExceeded => 6,
            JudgeStatus::OutputLimitExceeded => 7,
            JudgeStatus::RuntimeError => 8,
            JudgeStatus::PresentationError => 9,
            JudgeStatus::WrongAnswer => 10,
            JudgeStatus::Accept => 11,
            JudgeStatus::WaitingRunning => 12,
        }
    }

    /// Whether no further transition may happen from this status.
    ///
    /// `PresentationError` is not terminal: later test cases may still
    /// escalate it to `WrongAnswer` or a limit verdict.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JudgeStatus::SystemError
                | JudgeStatus::CompilationError
                | JudgeStatus::CompilationTimeLimitExceeded
                | JudgeStatus::TimeLimitExceeded
                | JudgeStatus::MemoryLimitExceeded
                | JudgeStatus::OutputLimitExceeded
                | JudgeStatus::RuntimeError
                | JudgeStatus::WrongAnswer
                | JudgeStatus::Accept
        )
    }

    /// Whether test cases may still be run and compared in this status
    pub fn keeps_judging(self) -> bool {
        matches!(
            self,
            JudgeStatus::WaitingRunning | JudgeStatus::PresentationError
        )
    }
}

impl From<JudgeStatus> for i8 {
    fn from(status: JudgeStatus) -> Self {
        status.code()
    }
}

impl TryFrom<i8> for JudgeStatus {
    type Error = String;

    fn try_from(code: i8) -> Result<Self, Self::Error> {
        let status = match code {
            -1 => JudgeStatus::SystemError,
            0 => JudgeStatus::Waiting,
            1 => JudgeStatus::Compiling,
            2 => JudgeStatus::CompilationError,
            3 => JudgeStatus::CompilationTimeLimitExceeded,
            4 => JudgeStatus::Running,
            5 => JudgeStatus::TimeLimitExceeded,
            6 => JudgeStatus::MemoryLimitExceeded,
            7 => JudgeStatus::OutputLimitExceeded,
            8 => JudgeStatus::RuntimeError,
            9 => JudgeStatus::PresentationError,
            10 => JudgeStatus::WrongAnswer,
            11 => JudgeStatus::Accept,
            12 => JudgeStatus::WaitingRunning,
            other => return Err(format!("unknown judge status code {}", other)),
        };
        Ok(status)
    }
}

impl fmt::Display for JudgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JudgeStatus::SystemError => "system_error",
            JudgeStatus::Waiting => "waiting",
            JudgeStatus::Compiling => "compiling",
            JudgeStatus::CompilationError => "compilation_error",
            JudgeStatus::CompilationTimeLimitExceeded => "compilation_time_limit_exceeded",
            JudgeStatus::Running => "running",
            JudgeStatus::TimeLimitExceeded => "time_limit_exceeded",
            JudgeStatus::MemoryLimitExceeded => "memory_limit_exceeded",
            JudgeStatus::OutputLimitExceeded => "output_limit_exceeded",
            JudgeStatus::RuntimeError => "runtime_error",
            JudgeStatus::PresentationError => "presentation_error",
            JudgeStatus::WrongAnswer => "wrong_answer",
            JudgeStatus::Accept => "accepted",
            JudgeStatus::WaitingRunning => "waiting_running",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presentation_error_is_not_terminal() {
        assert!(!JudgeStatus::PresentationError.is_terminal());
        assert!(JudgeStatus::PresentationError.keeps_judging());
        assert!(JudgeStatus::WrongAnswer.is_terminal());
    }

    #[test]
    fn test_intermediate_states_are_not_terminal() {
        for status in [
            JudgeStatus::Waiting,
            JudgeStatus::Compiling,
            JudgeStatus::Running,
            JudgeStatus::WaitingRunning,
        ] {
            assert!(!status.is_terminal(), "{} must not be terminal", status);
        }
    }

    #[test]
    fn test_status_serializes_as_code() {
        assert_eq!(serde_json::to_string(&JudgeStatus::SystemError).unwrap(), "-1");
        assert_eq!(serde_json::to_string(&JudgeStatus::Accept).unwrap(), "11");
        let status: JudgeStatus = serde_json::from_str("12").unwrap();
        assert_eq!(status, JudgeStatus::WaitingRunning);
        assert!(serde_json::from_str::<JudgeStatus>("42").is_err());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(JudgeStatus::Accept.to_string(), "accepted");
        assert_eq!(
            JudgeStatus::CompilationTimeLimitExceeded.to_string(),
            "compilation_time_limit_exceeded"
        );
    }
}
