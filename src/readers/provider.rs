// src/readers/provider.rs

//! The caller side of the wire protocol: run an `ltm -p` child process for
//! one [`ReadRequest`] and collect its [`ReadResponse`].
//!
//! [`ReadRequest`]: crate::marshal::messages::ReadRequest
//! [`ReadResponse`]: crate::marshal::messages::ReadResponse

use crate::common::{Count, EXIT_FILE_NOT_FOUND, EXIT_FILE_UNREADABLE, EXIT_OK};
use crate::marshal::codec::MarshalError;
use crate::marshal::messages::{ReadRequest, ReadResponse, WireMessage};

use std::ffi::OsStr;
use std::io::Write;
use std::process::{Command, Stdio};

#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

/// A completed call of the engine process.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProviderOutcome {
    Response(ReadResponse),
    /// The log file does not exist; the response carries zero matches.
    FileNotFound(ReadResponse),
    /// The log file exists but could not be read; zero matches.
    FileUnreadable(ReadResponse),
}

impl ProviderOutcome {
    pub const fn response(&self) -> &ReadResponse {
        match self {
            ProviderOutcome::Response(response)
            | ProviderOutcome::FileNotFound(response)
            | ProviderOutcome::FileUnreadable(response) => response,
        }
    }

    pub fn into_response(self) -> ReadResponse {
        match self {
            ProviderOutcome::Response(response)
            | ProviderOutcome::FileNotFound(response)
            | ProviderOutcome::FileUnreadable(response) => response,
        }
    }
}

/// A call of the engine process that produced no usable response.
#[derive(Debug, ::thiserror::Error)]
pub enum ProviderError {
    #[error("failed to run {program:?}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("wire error: {0}")]
    Marshal(#[from] MarshalError),
    /// The process exited with a failure code; `None` if killed by a signal.
    #[error("engine process exited with {code:?}: {stderr}")]
    Exit {
        code: Option<i32>,
        stderr: String,
    },
    #[error("response does not echo the request for {0:?}")]
    Mismatch(String),
}

/// Run `program` with `args` (normally `["-p"]`), send it `request`, and
/// wait for its response.
pub fn invoke_reader<P, A>(
    program: P,
    args: &[A],
    request: &ReadRequest,
) -> Result<ProviderOutcome, ProviderError>
where
    P: AsRef<OsStr>,
    A: AsRef<OsStr>,
{
    let program_s: String = program.as_ref().to_string_lossy().to_string();
    defn!("({:?}, {:?}, {:?})", program_s, request.file_path, request.subscription_id);
    let spawn_err = |source: std::io::Error| ProviderError::Spawn {
        program: program_s.clone(),
        source,
    };
    let mut child = Command::new(program.as_ref())
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_err)?;
    // a child that exits without reading its input breaks the pipe; its exit
    // code and stderr are still collected below
    let mut write_err: Option<MarshalError> = None;
    if let Some(mut stdin) = child.stdin.take() {
        let written = match request.write_to(&mut stdin) {
            Ok(_) => stdin.flush().map_err(MarshalError::from),
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            defo!("write request error {}", err);
            write_err = Some(err);
        }
        // dropping `stdin` closes the pipe
    }
    let output = child.wait_with_output().map_err(spawn_err)?;
    let code: Option<i32> = output.status.code();
    defo!("exit code {:?}, stdout {} bytes", code, output.stdout.len());
    let outcome = match code {
        Some(c)
            if c == EXIT_OK as i32 || c == EXIT_FILE_NOT_FOUND as i32 || c == EXIT_FILE_UNREADABLE as i32 =>
        {
            if let Some(err) = write_err {
                defx!("request not delivered");
                return Err(ProviderError::Marshal(err));
            }
            let response = ReadResponse::read_from(&mut output.stdout.as_slice())?;
            if !response.echoes(request) {
                defx!("response does not echo request");
                return Err(ProviderError::Mismatch(request.file_path.clone()));
            }
            match c as u8 {
                EXIT_OK => ProviderOutcome::Response(response),
                EXIT_FILE_NOT_FOUND => ProviderOutcome::FileNotFound(response),
                _ => ProviderOutcome::FileUnreadable(response),
            }
        }
        _ => {
            let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
            defx!("failed {:?} {:?}", code, stderr);
            return Err(ProviderError::Exit { code, stderr });
        }
    };
    defx!("matched {}", outcome.response().matched_line_count);

    Ok(outcome)
}

/// Call [`invoke_reader`] until a response is not a partial read, at most
/// `max_calls` times. Returns every response in order.
pub fn invoke_reader_until_drained<P, A>(
    program: P,
    args: &[A],
    request: &ReadRequest,
    max_calls: Count,
) -> Result<Vec<ProviderOutcome>, ProviderError>
where
    P: AsRef<OsStr>,
    A: AsRef<OsStr>,
{
    defn!("max_calls {}", max_calls);
    let mut outcomes: Vec<ProviderOutcome> = Vec::new();
    for _ in 0..max_calls {
        let outcome = invoke_reader(program.as_ref(), args, request)?;
        let partial = outcome.response().is_partial_read();
        outcomes.push(outcome);
        if !partial {
            break;
        }
    }
    defx!("{} calls", outcomes.len());

    Ok(outcomes)
}
