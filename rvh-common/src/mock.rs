//! Scripted in-memory transport for tests and dry runs.
//!
//! `MockTransport` records every shell line, replays scripted replies,
//! simulates the scratch log (tee'd output accumulates until drained, and a
//! tee'd pipeline only reports a failing status under `pipefail`), and
//! keeps pushed files in memory. Clones share state, so a test can hand one
//! clone to the code under test and inspect another.
//!
//! Binaries switch to the mock when `RVH_MOCK_SSH` is set to a truthy value.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::errors::TransportError;
use crate::scratch_log::{PIPEFAIL_PREFIX, ScratchLog};
use crate::transport::{CommandOutput, Transport};

/// Environment variable that switches binaries to the mock transport.
pub const MOCK_ENV_VAR: &str = "RVH_MOCK_SSH";

/// Whether `RVH_MOCK_SSH` asks for the mock transport.
pub fn is_mock_enabled() -> bool {
    std::env::var(MOCK_ENV_VAR)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// A transport failure the mock can replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFailure {
    /// Rendered as an "i/o timeout" transport error.
    TimedOut(String),
    /// Rendered as a generic SSH error.
    Ssh(String),
}

impl MockFailure {
    fn into_error(self) -> TransportError {
        match self {
            Self::TimedOut(detail) => TransportError::TimedOut { detail },
            Self::Ssh(msg) => TransportError::Ssh(msg),
        }
    }
}

pub type MockReply = Result<CommandOutput, MockFailure>;

/// A file written through [`Transport::push`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockFile {
    pub mode: u32,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
struct MockState {
    commands: Vec<String>,
    replies: VecDeque<MockReply>,
    default_reply: MockReply,
    progress: String,
    scratch: String,
    drains: usize,
    drain_failures: usize,
    drain_failure_stderr: String,
    files: BTreeMap<String, MockFile>,
    pushes: Vec<String>,
    push_failures: HashMap<String, MockFailure>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            replies: VecDeque::new(),
            default_reply: Ok(CommandOutput::ok("")),
            progress: String::new(),
            scratch: String::new(),
            drains: 0,
            drain_failures: 0,
            drain_failure_stderr: String::new(),
            files: BTreeMap::new(),
            pushes: Vec::new(),
            push_failures: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    drain_line: String,
    tee_suffix: String,
    latency: Duration,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// A mock that answers every command with empty successful output.
    pub fn new() -> Self {
        Self::with_scratch_log(&ScratchLog::default())
    }

    /// A mock that recognises drains and tees for a custom scratch log.
    pub fn with_scratch_log(log: &ScratchLog) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            drain_line: log.drain_command(),
            tee_suffix: log.tee_suffix(),
            latency: Duration::ZERO,
        }
    }

    /// Delay every non-drain command by `latency` before replying.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a reply for the next non-drain command.
    pub fn push_reply(&self, reply: MockReply) {
        self.lock().replies.push_back(reply);
    }

    /// Reply used once the script is exhausted.
    pub fn set_default_reply(&self, reply: MockReply) {
        self.lock().default_reply = reply;
    }

    /// Text a tee'd command writes to the scratch log as soon as it starts.
    pub fn set_progress(&self, text: impl Into<String>) {
        self.lock().progress = text.into();
    }

    /// Append text to the simulated scratch log.
    pub fn write_scratch(&self, text: &str) {
        self.lock().scratch.push_str(text);
    }

    /// Make the next `count` drains exit non-zero.
    pub fn fail_drains(&self, count: usize, stderr: impl Into<String>) {
        let mut state = self.lock();
        state.drain_failures = count;
        state.drain_failure_stderr = stderr.into();
    }

    /// Make the next push to `remote_path` fail.
    pub fn fail_push(&self, remote_path: impl Into<String>, failure: MockFailure) {
        self.lock().push_failures.insert(remote_path.into(), failure);
    }

    /// Non-drain command lines, in call order.
    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }

    /// Number of non-drain commands issued.
    pub fn call_count(&self) -> usize {
        self.lock().commands.len()
    }

    /// Number of scratch-log drains issued.
    pub fn drain_count(&self) -> usize {
        self.lock().drains
    }

    /// Current scratch log contents.
    pub fn scratch(&self) -> String {
        self.lock().scratch.clone()
    }

    /// Remote paths passed to push, in call order, including failed ones.
    pub fn pushes(&self) -> Vec<String> {
        self.lock().pushes.clone()
    }

    /// Files successfully written, keyed by remote path.
    pub fn files(&self) -> BTreeMap<String, MockFile> {
        self.lock().files.clone()
    }

    pub fn file(&self, remote_path: &str) -> Option<MockFile> {
        self.lock().files.get(remote_path).cloned()
    }

    fn drain(&self) -> CommandOutput {
        let mut state = self.lock();
        state.drains += 1;
        if state.drain_failures > 0 {
            state.drain_failures -= 1;
            return CommandOutput::failed(1, state.drain_failure_stderr.clone());
        }
        CommandOutput::ok(std::mem::take(&mut state.scratch))
    }
}

impl Transport for MockTransport {
    async fn run(&self, command_line: &str) -> Result<CommandOutput, TransportError> {
        if command_line == self.drain_line {
            return Ok(self.drain());
        }

        let tees = command_line.ends_with(&self.tee_suffix);
        let reply = {
            let mut state = self.lock();
            state.commands.push(command_line.to_string());
            if tees {
                let progress = state.progress.clone();
                state.scratch.push_str(&progress);
            }
            match state.replies.pop_front() {
                Some(reply) => reply,
                None => state.default_reply.clone(),
            }
        };

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match reply {
            Ok(mut output) => {
                if tees {
                    self.lock().scratch.push_str(&output.stdout);
                    // Without pipefail a pipeline reports tee's status.
                    if !command_line.starts_with(PIPEFAIL_PREFIX) {
                        output.exit_code = 0;
                    }
                }
                Ok(output)
            }
            Err(failure) => Err(failure.into_error()),
        }
    }

    async fn push(&self, remote_path: &str, mode: u32, bytes: &[u8]) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.pushes.push(remote_path.to_string());
        if let Some(failure) = state.push_failures.remove(remote_path) {
            return Err(failure.into_error());
        }
        state.files.insert(
            remote_path.to_string(),
            MockFile {
                mode,
                bytes: bytes.to_vec(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use crate::config::env_test_lock;

    #[tokio::test]
    async fn test_default_reply_is_empty_success() {
        let mock = MockTransport::new();
        let out = mock.run("bash -c 'true'").await.unwrap();
        assert_eq!(out, CommandOutput::ok(""));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_script_then_default() {
        let mock = MockTransport::new();
        mock.push_reply(Err(MockFailure::TimedOut("read".into())));
        mock.set_default_reply(Ok(CommandOutput::ok("done")));

        let err = mock.run("a").await.unwrap_err();
        assert!(err.to_string().contains("i/o timeout"));
        assert_eq!(mock.run("b").await.unwrap().stdout, "done");
        assert_eq!(mock.commands(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_tee_accumulates_in_scratch() {
        let log = ScratchLog::default();
        let mock = MockTransport::new();
        mock.set_progress("step 1\n");
        mock.push_reply(Ok(CommandOutput::ok("step 2\n")));

        mock.run(&log.attach("bash -c 'make'")).await.unwrap();
        assert_eq!(mock.scratch(), "step 1\nstep 2\n");

        // Untee'd commands leave the log alone.
        mock.run("bash -c 'make'").await.unwrap();
        assert_eq!(mock.scratch(), "step 1\nstep 2\n");
    }

    #[tokio::test]
    async fn test_tee_pipeline_status_depends_on_pipefail() {
        let log = ScratchLog::default();
        let mock = MockTransport::new();
        mock.set_default_reply(Ok(CommandOutput::failed(3, "NotFound")));

        let bare = format!("bash -c 'exit 3'{}", log.tee_suffix());
        assert_eq!(mock.run(&bare).await.unwrap().exit_code, 0);

        let piped = log.attach("bash -c 'exit 3'");
        assert_eq!(mock.run(&piped).await.unwrap().exit_code, 3);

        // Untee'd lines keep the scripted status.
        assert_eq!(mock.run("bash -c 'exit 3'").await.unwrap().exit_code, 3);
    }

    #[tokio::test]
    async fn test_drains_are_not_recorded_as_commands() {
        let log = ScratchLog::default();
        let mock = MockTransport::new();
        mock.write_scratch("hello");
        let out = mock.run(&log.drain_command()).await.unwrap();
        assert_eq!(out.stdout, "hello");
        assert_eq!(mock.call_count(), 0);
        assert_eq!(mock.drain_count(), 1);
    }

    #[tokio::test]
    async fn test_push_failure_is_one_shot() {
        let mock = MockTransport::new();
        mock.fail_push("/data/split_src_0", MockFailure::Ssh("broken pipe".into()));

        assert!(mock.push("/data/split_src_0", 0o644, b"abc").await.is_err());
        mock.push("/data/split_src_0", 0o644, b"abc").await.unwrap();

        assert_eq!(mock.pushes().len(), 2);
        assert_eq!(
            mock.file("/data/split_src_0"),
            Some(MockFile {
                mode: 0o644,
                bytes: b"abc".to_vec()
            })
        );
    }

    #[test]
    fn test_is_mock_enabled_reads_env() {
        let _guard = env_test_lock();
        // SAFETY: guarded by the shared env test lock.
        unsafe { std::env::set_var(MOCK_ENV_VAR, "true") };
        assert!(is_mock_enabled());
        unsafe { std::env::set_var(MOCK_ENV_VAR, "0") };
        assert!(!is_mock_enabled());
        unsafe { std::env::remove_var(MOCK_ENV_VAR) };
        assert!(!is_mock_enabled());
    }
}
