use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use tracing::{instrument, trace};

use crate::agent::ProcessAgent;
use crate::cgroup_manager::{spawn_agent_process, ContainedProcess, ProcessLimits};

/// Why an exchange with an agent process did not produce an answer.
#[derive(Debug)]
pub(crate) enum ClientError {
    /// Deadline reached.
    TimedOut,
    /// The agent (or its launch) failed before the deadline.
    Failed(anyhow::Error),
}

impl From<anyhow::Error> for ClientError {
    fn from(e: anyhow::Error) -> Self {
        ClientError::Failed(e)
    }
}

/// How the process is started.
#[derive(Debug, Clone, Default)]
pub(crate) struct LaunchSettings {
    pub limits: ProcessLimits,
    pub allow_uncontained: bool,
    pub allow_stderr: bool,
}

/// Connection to a freshly launched agent process.
///
/// The process is killed when the handler is dropped.
#[derive(Debug)]
pub(crate) struct ClientHandler {
    reader: BufReader<TcpStream>,
    stream: TcpStream,
    process: ContainedProcess,
}

impl ClientHandler {
    const KILL_DURATION: Duration = Duration::from_millis(500);
    /// Longest answer line accepted, newline included.
    const MAX_ANSWER_LEN: usize = 32;

    /// Launch `agent` and wait for it to connect back, until `deadline`.
    #[instrument(skip_all, fields(agent = agent.name))]
    pub fn init(
        agent: &ProcessAgent,
        settings: &LaunchSettings,
        timeout: Duration,
        deadline: Instant,
    ) -> Result<ClientHandler, ClientError> {
        let path = agent
            .path_to_exe
            .to_str()
            .context("path is not a valid string")?;

        let listener = TcpListener::bind("127.0.0.1:0")
            .context("server error: could not create TcpListener")?;
        let port = listener
            .local_addr()
            .context("server error: no local address")?
            .port();

        let mut args = vec![port.to_string(), timeout.as_micros().to_string()];
        args.extend(agent.args.iter().cloned());

        let mut process = spawn_agent_process(
            path,
            &args,
            &settings.limits,
            settings.allow_uncontained,
            settings.allow_stderr,
        )?;

        listener
            .set_nonblocking(true)
            .context("server error: setting non-blocking to true")?;

        while Instant::now() < deadline {
            match listener.accept() {
                Ok((stream, _addr)) => {
                    trace!("agent connected");
                    stream
                        .set_nonblocking(false)
                        .context("server error: setting blocking on stream")?;
                    let reader = BufReader::new(
                        stream
                            .try_clone()
                            .context("server error: cloning stream")?,
                    );
                    return Ok(ClientHandler {
                        reader,
                        stream,
                        process,
                    });
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => return Err(anyhow!(e).context("server error: accept failed").into()),
            }
            if let Some(status) = process.try_exit_status() {
                return Err(anyhow!("agent exited before connecting ({status})").into());
            }
            thread::sleep(Duration::from_millis(1));
        }

        // late connections go to a closed listener
        let _ = process.try_kill(Self::KILL_DURATION);
        Err(ClientError::TimedOut)
    }

    /// Send one request line and read one answer line, until `deadline`.
    ///
    /// The deadline is checked before every chunk read, and an answer longer than
    /// [`MAX_ANSWER_LEN`](Self::MAX_ANSWER_LEN) bytes is a failure.
    #[instrument(skip_all)]
    pub fn send_and_recv(&mut self, msg: &[u8], deadline: Instant) -> Result<String, ClientError> {
        self.stream
            .write_all(msg)
            .context("could not send request to agent")?;
        self.stream.flush().context("could not send request to agent")?;

        let mut answer = Vec::with_capacity(Self::MAX_ANSWER_LEN);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ClientError::TimedOut);
            }
            self.stream
                .set_read_timeout(Some(remaining))
                .context("server error: setting read timeout")?;

            let chunk = match self.reader.fill_buf() {
                Ok(chunk) => chunk,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Err(ClientError::TimedOut)
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(anyhow!(e).context("error while reading stream").into()),
            };

            if chunk.is_empty() {
                // answer without trailing newline, then EOF
                if !answer.is_empty() {
                    return Ok(Self::decode_answer(answer)?);
                }
                return Err(match self.process.try_exit_status() {
                    Some(status) => anyhow!("agent exited without answering ({status})"),
                    None => anyhow!("connection closed by agent"),
                }
                .into());
            }

            let (taken, complete) = match chunk.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (chunk.len(), false),
            };
            if answer.len() + taken > Self::MAX_ANSWER_LEN {
                return Err(anyhow!(
                    "answer longer than {} bytes, expected a column number",
                    Self::MAX_ANSWER_LEN
                )
                .into());
            }
            answer.extend_from_slice(&chunk[..taken]);
            self.reader.consume(taken);

            if complete {
                return Ok(Self::decode_answer(answer)?);
            }
        }
    }

    fn decode_answer(answer: Vec<u8>) -> anyhow::Result<String> {
        String::from_utf8(answer).context("answer is not valid UTF-8")
    }

    /// Kill the agent process now rather than on drop.
    pub fn kill_child(mut self) -> anyhow::Result<()> {
        self.process.try_kill(Self::KILL_DURATION)
    }
}
