// src/policy/spec.rs

use std::fmt;
use std::time::Duration;

pub const REFUSED: &str = "REFUSED";
pub const NONE: &str = "NONE";
pub const EXECUTE: &str = "EXECUTE";
pub const JAVAEXECUTE: &str = "JAVAEXECUTE";
pub const R66PREPARETRANSFER: &str = "R66PREPARETRANSFER";

/// What kind of side-action a direction is configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Refused,
    NoOp,
    Process,
    InProcessTask,
    TransferSubmission,
}

impl ActionKind {
    /// Configuration keyword for this kind.
    pub fn keyword(&self) -> &'static str {
        match self {
            ActionKind::Refused => REFUSED,
            ActionKind::NoOp => NONE,
            ActionKind::Process => EXECUTE,
            ActionKind::InProcessTask => JAVAEXECUTE,
            ActionKind::TransferSubmission => R66PREPARETRANSFER,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Truncate a configured delay to a multiple of 10 ms.
pub fn delay_from_millis(ms: u64) -> Duration {
    Duration::from_millis((ms / 10) * 10)
}

/// A parsed action line.
///
/// `refused` is always true for [`ActionKind::Refused`]. A zero `delay`
/// means "no time limit".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpec {
    pub kind: ActionKind,
    /// Kind-specific payload: a command line, a task name with arguments, or
    /// a transfer DSL string. Not yet rendered.
    pub command: String,
    pub refused: bool,
    pub delay: Duration,
}

impl ActionSpec {
    /// The "nothing configured" spec.
    pub fn none() -> Self {
        Self {
            kind: ActionKind::NoOp,
            command: String::new(),
            refused: false,
            delay: Duration::ZERO,
        }
    }

    pub fn refused() -> Self {
        Self {
            kind: ActionKind::Refused,
            command: String::new(),
            refused: true,
            delay: Duration::ZERO,
        }
    }

    /// Parse one configuration value.
    ///
    /// An empty (or blank) `value` returns `fallback` unchanged, including
    /// its delay. Otherwise the value is classified by prefix and `delay` is
    /// attached to the result.
    pub fn parse(value: &str, delay: Duration, fallback: &ActionSpec) -> ActionSpec {
        let value = value.trim();
        if value.is_empty() {
            return fallback.clone();
        }

        if value.starts_with(REFUSED) {
            return ActionSpec {
                delay,
                ..ActionSpec::refused()
            };
        }

        let (kind, command) = if let Some(rest) = value.strip_prefix(EXECUTE) {
            (ActionKind::Process, rest)
        } else if let Some(rest) = value.strip_prefix(R66PREPARETRANSFER) {
            (ActionKind::TransferSubmission, rest)
        } else if let Some(rest) = value.strip_prefix(JAVAEXECUTE) {
            (ActionKind::InProcessTask, rest)
        } else {
            (ActionKind::NoOp, value.strip_prefix(NONE).unwrap_or(value))
        };

        ActionSpec {
            kind,
            command: command.trim().to_string(),
            refused: false,
            delay,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl fmt::Display for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}ms:refused={}",
            self.kind,
            self.command,
            self.delay.as_millis(),
            self.refused
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const D: Duration = Duration::from_millis(500);

    #[test]
    fn classifies_each_prefix() {
        let fb = ActionSpec::none();

        let s = ActionSpec::parse("EXECUTE /bin/echo #FILE#", D, &fb);
        assert_eq!(s.kind, ActionKind::Process);
        assert_eq!(s.command, "/bin/echo #FILE#");
        assert_eq!(s.delay, D);
        assert!(!s.refused);

        let s = ActionSpec::parse("JAVAEXECUTE log a b", D, &fb);
        assert_eq!(s.kind, ActionKind::InProcessTask);
        assert_eq!(s.command, "log a b");

        let s = ActionSpec::parse("R66PREPARETRANSFER -to h -file f -rule r", D, &fb);
        assert_eq!(s.kind, ActionKind::TransferSubmission);
        assert_eq!(s.command, "-to h -file f -rule r");

        let s = ActionSpec::parse("NONE whatever", D, &fb);
        assert_eq!(s.kind, ActionKind::NoOp);
        assert_eq!(s.command, "whatever");

        let s = ActionSpec::parse("something else", D, &fb);
        assert_eq!(s.kind, ActionKind::NoOp);
        assert_eq!(s.command, "something else");
    }

    #[test]
    fn refused_sets_flag() {
        let s = ActionSpec::parse("REFUSED", D, &ActionSpec::none());
        assert_eq!(s.kind, ActionKind::Refused);
        assert!(s.refused);
    }

    #[test]
    fn blank_returns_fallback_with_its_delay() {
        let fb = ActionSpec::parse(
            "EXECUTE /bin/true",
            Duration::from_millis(70),
            &ActionSpec::none(),
        );
        assert_eq!(ActionSpec::parse("   ", D, &fb), fb);
    }

    #[test]
    fn delays_are_truncated_to_ten_ms() {
        assert_eq!(delay_from_millis(1234), Duration::from_millis(1230));
        assert_eq!(delay_from_millis(9), Duration::ZERO);
    }

    fn any_spec() -> impl Strategy<Value = ActionSpec> {
        (
            prop_oneof![
                Just("REFUSED"),
                Just("EXECUTE /bin/true"),
                Just("JAVAEXECUTE log x"),
                Just("R66PREPARETRANSFER -to a"),
                Just("NONE"),
            ],
            0u64..100_000,
        )
            .prop_map(|(line, ms)| {
                ActionSpec::parse(line, Duration::from_millis(ms), &ActionSpec::none())
            })
    }

    proptest! {
        #[test]
        fn empty_input_is_identity(fallback in any_spec()) {
            prop_assert_eq!(ActionSpec::parse("", D, &fallback), fallback);
        }

        #[test]
        fn refused_regardless_of_fallback(fallback in any_spec(), tail in "[ a-z]{0,10}") {
            let s = ActionSpec::parse(&format!("REFUSED{tail}"), D, &fallback);
            prop_assert!(s.refused);
            prop_assert_eq!(s.kind, ActionKind::Refused);
        }

        #[test]
        fn refused_kind_implies_flag(line in "\\PC{0,40}") {
            let s = ActionSpec::parse(&line, D, &ActionSpec::none());
            prop_assert!(s.kind != ActionKind::Refused || s.refused);
        }
    }
}
