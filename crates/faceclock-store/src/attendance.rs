//! Attendance state machine with flat-file persistence.

use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;

const SNAPSHOT_FILE: &str = "user_status.txt";
const CLOCK_IN_LOG: &str = "clock_in_times.txt";
const CLOCK_OUT_LOG: &str = "clock_out_times.txt";

/// Timestamp format used in the snapshot and event logs.
pub const EVENT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A clock transition direction. Per user, actions strictly alternate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockAction {
    In,
    Out,
}

impl ClockAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ClockAction::In => "in",
            ClockAction::Out => "out",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "in" => Some(ClockAction::In),
            "out" => Some(ClockAction::Out),
            _ => None,
        }
    }

    fn log_file(self) -> &'static str {
        match self {
            ClockAction::In => CLOCK_IN_LOG,
            ClockAction::Out => CLOCK_OUT_LOG,
        }
    }
}

impl fmt::Display for ClockAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ClockError {
    #[error("{username} is already clocked {action}")]
    AlreadyInThatState { username: String, action: ClockAction },
    #[error("ledger io: {0}")]
    Io(#[from] std::io::Error),
}

/// An applied clock transition. Never mutated once appended to the log.
#[derive(Debug, Clone)]
pub struct AttendanceEvent {
    pub username: String,
    pub action: ClockAction,
    pub timestamp: DateTime<Local>,
}

impl AttendanceEvent {
    fn log_line(&self) -> String {
        format!(
            "{} clocked {} on {}\n",
            self.username,
            self.action,
            self.timestamp.format(EVENT_TIMESTAMP_FORMAT)
        )
    }
}

/// Per-user clock state, persisted as a full snapshot plus append-only
/// per-action logs.
///
/// A user absent from the snapshot counts as clocked out. The snapshot is
/// rewritten whole on every change so there is always one complete,
/// consistent file on disk rather than a log to replay.
pub struct AttendanceLedger {
    data_dir: PathBuf,
    /// Username → (last action, timestamp of that action).
    status: BTreeMap<String, (ClockAction, String)>,
}

impl AttendanceLedger {
    /// Load the ledger from `data_dir`, creating the directory if absent.
    ///
    /// A missing snapshot means an empty ledger; malformed snapshot lines
    /// are skipped with a warning.
    pub fn load(data_dir: impl Into<PathBuf>) -> Result<Self, std::io::Error> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;

        let mut status = BTreeMap::new();
        let snapshot = data_dir.join(SNAPSHOT_FILE);
        if snapshot.exists() {
            for line in fs::read_to_string(&snapshot)?.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                match parse_snapshot_line(line) {
                    Some((username, action, timestamp)) => {
                        status.insert(username, (action, timestamp));
                    }
                    None => tracing::warn!(line, "skipping malformed status line"),
                }
            }
        }

        tracing::debug!(dir = %data_dir.display(), users = status.len(), "attendance ledger loaded");
        Ok(Self { data_dir, status })
    }

    /// Current status for a user; unknown users are clocked out.
    pub fn status(&self, username: &str) -> ClockAction {
        self.status
            .get(username)
            .map(|&(action, _)| action)
            .unwrap_or(ClockAction::Out)
    }

    pub fn statuses(&self) -> impl Iterator<Item = (&str, ClockAction)> {
        self.status
            .iter()
            .map(|(user, &(action, _))| (user.as_str(), action))
    }

    /// Apply a clock transition for `username`.
    ///
    /// Guard: the stored status must differ from the requested action — a
    /// user clocked in must clock out before clocking in again. A user with
    /// no record may clock either way first. On success the event is
    /// appended to the action's log and the snapshot is rewritten.
    pub fn clock(
        &mut self,
        username: &str,
        action: ClockAction,
    ) -> Result<AttendanceEvent, ClockError> {
        if self.status.get(username).map(|&(a, _)| a) == Some(action) {
            return Err(ClockError::AlreadyInThatState {
                username: username.to_string(),
                action,
            });
        }

        let event = AttendanceEvent {
            username: username.to_string(),
            action,
            timestamp: Local::now(),
        };

        self.append_event(&event)?;
        self.status.insert(
            event.username.clone(),
            (action, event.timestamp.format(EVENT_TIMESTAMP_FORMAT).to_string()),
        );
        self.write_snapshot()?;

        tracing::info!(username, action = %action, "clock transition applied");
        Ok(event)
    }

    fn append_event(&self, event: &AttendanceEvent) -> Result<(), std::io::Error> {
        let path = self.data_dir.join(event.action.log_file());
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(event.log_line().as_bytes())
    }

    fn write_snapshot(&self) -> Result<(), std::io::Error> {
        let mut contents = String::new();
        for (username, (action, timestamp)) in &self.status {
            contents.push_str(&format!("{username} clocked {action} on {timestamp}\n"));
        }
        fs::write(self.data_dir.join(SNAPSHOT_FILE), contents)
    }
}

/// Parse one snapshot line: `{username} clocked {in|out} on {timestamp}`.
fn parse_snapshot_line(line: &str) -> Option<(String, ClockAction, String)> {
    let mut fields = line.split_whitespace();
    let username = fields.next()?;
    if fields.next()? != "clocked" {
        return None;
    }
    let action = ClockAction::parse(fields.next()?)?;
    if fields.next()? != "on" {
        return None;
    }
    let timestamp = fields.collect::<Vec<_>>().join(" ");
    Some((username.to_string(), action, timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unknown_user_is_out() {
        let tmp = TempDir::new().unwrap();
        let ledger = AttendanceLedger::load(tmp.path()).unwrap();
        assert_eq!(ledger.status("nobody"), ClockAction::Out);
    }

    #[test]
    fn test_first_action_unconstrained() {
        // The guard only blocks repeating the same action; a new user may
        // start with either direction.
        let tmp = TempDir::new().unwrap();
        let mut ledger = AttendanceLedger::load(tmp.path()).unwrap();
        ledger.clock("alice", ClockAction::In).unwrap();
        ledger.clock("bob", ClockAction::Out).unwrap();
    }

    #[test]
    fn test_repeat_action_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut ledger = AttendanceLedger::load(tmp.path()).unwrap();
        ledger.clock("alice", ClockAction::In).unwrap();
        let err = ledger.clock("alice", ClockAction::In).unwrap_err();
        assert!(matches!(
            err,
            ClockError::AlreadyInThatState { ref username, action: ClockAction::In }
                if username == "alice"
        ));
        // The opposite direction still works
        ledger.clock("alice", ClockAction::Out).unwrap();
    }

    #[test]
    fn test_alternating_always_succeeds() {
        let tmp = TempDir::new().unwrap();
        let mut ledger = AttendanceLedger::load(tmp.path()).unwrap();
        for _ in 0..10 {
            ledger.clock("alice", ClockAction::In).unwrap();
            ledger.clock("alice", ClockAction::Out).unwrap();
        }
    }

    #[test]
    fn test_users_are_independent() {
        let tmp = TempDir::new().unwrap();
        let mut ledger = AttendanceLedger::load(tmp.path()).unwrap();
        ledger.clock("alice", ClockAction::In).unwrap();
        // Bob's first clock-in is unaffected by Alice's state
        ledger.clock("bob", ClockAction::In).unwrap();
        assert_eq!(ledger.status("alice"), ClockAction::In);
        assert_eq!(ledger.status("bob"), ClockAction::In);
    }

    #[test]
    fn test_state_survives_reload() {
        let tmp = TempDir::new().unwrap();
        {
            let mut ledger = AttendanceLedger::load(tmp.path()).unwrap();
            ledger.clock("alice", ClockAction::In).unwrap();
            ledger.clock("bob", ClockAction::In).unwrap();
            ledger.clock("bob", ClockAction::Out).unwrap();
        }
        let mut ledger = AttendanceLedger::load(tmp.path()).unwrap();
        assert_eq!(ledger.status("alice"), ClockAction::In);
        assert_eq!(ledger.status("bob"), ClockAction::Out);
        // Guard still holds across the restart
        assert!(ledger.clock("alice", ClockAction::In).is_err());
    }

    #[test]
    fn test_event_logs_append_only() {
        let tmp = TempDir::new().unwrap();
        let mut ledger = AttendanceLedger::load(tmp.path()).unwrap();
        ledger.clock("alice", ClockAction::In).unwrap();
        ledger.clock("alice", ClockAction::Out).unwrap();
        ledger.clock("alice", ClockAction::In).unwrap();

        let in_log = std::fs::read_to_string(tmp.path().join(CLOCK_IN_LOG)).unwrap();
        let out_log = std::fs::read_to_string(tmp.path().join(CLOCK_OUT_LOG)).unwrap();
        assert_eq!(in_log.lines().count(), 2);
        assert_eq!(out_log.lines().count(), 1);
        assert!(in_log.lines().all(|l| l.starts_with("alice clocked in on ")));
        assert!(out_log.starts_with("alice clocked out on "));
    }

    #[test]
    fn test_snapshot_format() {
        let tmp = TempDir::new().unwrap();
        let mut ledger = AttendanceLedger::load(tmp.path()).unwrap();
        ledger.clock("alice", ClockAction::In).unwrap();

        let snapshot = std::fs::read_to_string(tmp.path().join(SNAPSHOT_FILE)).unwrap();
        let line = snapshot.lines().next().unwrap();
        let (username, action, timestamp) = parse_snapshot_line(line).unwrap();
        assert_eq!(username, "alice");
        assert_eq!(action, ClockAction::In);
        assert!(!timestamp.is_empty());
    }

    #[test]
    fn test_snapshot_keeps_per_user_timestamps() {
        // Rewriting the snapshot for bob must not re-stamp alice's line
        let tmp = TempDir::new().unwrap();
        let mut ledger = AttendanceLedger::load(tmp.path()).unwrap();
        let alice_event = ledger.clock("alice", ClockAction::In).unwrap();
        ledger.clock("bob", ClockAction::In).unwrap();

        let snapshot = std::fs::read_to_string(tmp.path().join(SNAPSHOT_FILE)).unwrap();
        let alice_line = snapshot.lines().find(|l| l.starts_with("alice ")).unwrap();
        let (_, _, timestamp) = parse_snapshot_line(alice_line).unwrap();
        assert_eq!(
            timestamp,
            alice_event.timestamp.format(EVENT_TIMESTAMP_FORMAT).to_string()
        );
    }

    #[test]
    fn test_malformed_snapshot_lines_skipped() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(SNAPSHOT_FILE),
            "alice clocked in on 2024-01-01 09:00:00\n\
             garbage line\n\
             bob clocked sideways on 2024-01-01 09:00:00\n\
             carol clocked out on 2024-01-01 17:00:00\n",
        )
        .unwrap();
        let ledger = AttendanceLedger::load(tmp.path()).unwrap();
        assert_eq!(ledger.status("alice"), ClockAction::In);
        assert_eq!(ledger.status("carol"), ClockAction::Out);
        assert_eq!(ledger.statuses().count(), 2);
    }
}
