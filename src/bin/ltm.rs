// src/bin/ltm.rs

//! Driver program _ltm_ (log tail matcher).
//!
//! Processes user-passed command-line arguments, decides one operation,
//! then runs it using library [_ltmlib_].
//!
//! In operations `-p`, `-r`, `-g` and `-m` the standard input and standard
//! output carry [`marshal`] frames only; diagnostics go to standard error.
//! The exit code is the result a calling process acts on.
//!
//! [_ltmlib_]: ltmlib
//! [`marshal`]: ltmlib::marshal

#![allow(non_camel_case_types)]

// first setup the custom global allocator
use ::ltmlib::common::AllocatorChosen;

cfg_if::cfg_if! {
    if #[cfg(feature = "jemalloc")] {
        use ::tikv_jemallocator::Jemalloc;
        #[global_allocator]
        static GLOBAL: Jemalloc = Jemalloc;
        const ALLOCATOR_CHOSEN: AllocatorChosen = AllocatorChosen::Jemalloc;
        const CLI_HELP_AFTER_ALLOCATOR: &str = "jemalloc";
    }
    else if #[cfg(feature = "mimalloc")] {
        use ::mimalloc::MiMalloc;
        #[global_allocator]
        static GLOBAL: MiMalloc = MiMalloc;
        const ALLOCATOR_CHOSEN: AllocatorChosen = AllocatorChosen::Mimalloc;
        const CLI_HELP_AFTER_ALLOCATOR: &str = "mimalloc";
    }
    else {
        const ALLOCATOR_CHOSEN: AllocatorChosen = AllocatorChosen::System;
        const CLI_HELP_AFTER_ALLOCATOR: &str = "system";
    }
}

use std::io::{BufRead, Read, Write};
use std::process::ExitCode;

use ::anyhow::Context;
use ::clap::error::{ContextKind, ContextValue, ErrorKind as ClapErrorKind};
use ::clap::Parser;
use ::const_format::concatcp;
use ::encoding_rs::Encoding;
use ::ltmlib::common::{
    Count, FPath, BYTE_BUDGET_DEFAULT, BYTE_BUDGET_MAX, BYTE_BUDGET_MIN, EXIT_FILE_NOT_FOUND,
    EXIT_FILE_UNREADABLE, EXIT_LOGIC_ERROR, EXIT_OK, EXIT_PROTOCOL, EXIT_UNEXPECTED, STATE_DIR_DEFAULT,
};
use ::ltmlib::data::pattern::{Pattern, PatternSpec};
use ::ltmlib::data::readstate::{ResetPolicy, Subscription};
use ::ltmlib::debug::printers::{e_err, e_wrn};
use ::ltmlib::marshal::codec::MarshalError;
use ::ltmlib::marshal::messages::{
    MarshalTestRequest, ReadRequest, ReadResponse, ResetRequest, WireMessage,
};
use ::ltmlib::readers::filesession::encoding_supported;
use ::ltmlib::readers::helpers::parse_bool_like;
use ::ltmlib::readers::statestore::StateStore;
use ::ltmlib::readers::tailmatcher::{EngineConfig, TailError, TailMatcher};
#[allow(unused_imports)]
use ::si_trace_print::stack::stack_offset_set;
#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

// --------------------
// command-line parsing

/// Program name used in messages.
const NAME: &str = "ltm";

/// `-t` state directory.
const STATE_DIR_TEST_MODE: &str = "./";

/// `-?` and invalid-option message.
const CLI_HELP_BRIEF: &str = concatcp!(NAME, ": Try '", NAME, " -h' for more information.");

#[cfg(debug_assertions)]
const CLI_HELP_AFTER_NOTE_DEBUG: &str = "\nDEBUG BUILD";
#[cfg(not(debug_assertions))]
const CLI_HELP_AFTER_NOTE_DEBUG: &str = "";

/// `-v` message.
const CLI_VERSION: &str = concatcp!(
    "Version: ",
    env!("CARGO_PKG_VERSION_MAJOR"), ".",
    env!("CARGO_PKG_VERSION_MINOR"), ".",
    env!("CARGO_PKG_VERSION_PATCH"), "\n",
    "MSRV: ", env!("CARGO_PKG_RUST_VERSION"), "\n",
    "Allocator: ", CLI_HELP_AFTER_ALLOCATOR, "\n",
    "License: ", env!("CARGO_PKG_LICENSE"),
    CLI_HELP_AFTER_NOTE_DEBUG,
);

/// `-h` message.
const CLI_HELP: &str = concatcp!(
    "Usage: ", NAME, " <OPERATION> [OPTIONS]\n",
    "\n",
    env!("CARGO_PKG_DESCRIPTION"), "\n",
    "\n",
    "Operations:\n",
    "  -h                     Display detailed help information\n",
    "  -?                     Display brief help information\n",
    "  -v                     Display version information\n",
    "  -g <BOOL>              Reset all subscription states; BOOL is reset-on-read (1/true/0/false)\n",
    "  -i                     Interactive use (for debugging purposes only)\n",
    "  -m                     Run marshal self test (for debugging purposes only)\n",
    "  -p                     Provider interface, read one request from STDIN (for internal use only)\n",
    "  -r                     Reset one subscription state from a request on STDIN (for internal use only)\n",
    "\n",
    "Options:\n",
    "  -t                     Test mode, keep state records in the current directory\n",
    "  --state-dir <DIR>      Directory of state records [env: LTM_STATE_DIR] [default: ", STATE_DIR_DEFAULT, "]\n",
    "  --byte-budget <N>      Bytes one pass may consume, may be hex 0x, octal 0o, or binary 0b [default: 65536]\n",
    "  --max-matched-lines <N>  Stop a pass after N matched lines [default: no limit]\n",
    "  --encoding <LABEL>     Encoding of log files, a WHATWG label like \"iso-8859-1\"; UTF-16 is not supported [default: utf-8]\n",
    "\n",
    "Exit codes:\n",
    "  0   success\n",
    "  2   log file not found (a zero-match response is still written)\n",
    "  4   unexpected error\n",
    "  5   malformed or truncated request\n",
    "  13  log file unreadable (a zero-match response is still written)\n",
    "  22  invalid pattern\n",
    "  64  invalid option or option argument, or conflicting operations\n",
);

/// clap command-line arguments build-time definitions.
///
/// clap's own help and version flags are disabled; `-h`, `-?` and `-v` are
/// operations like the rest.
#[derive(Parser, Debug)]
#[clap(
    name = NAME,
    disable_help_flag = true,
    disable_version_flag = true,
)]
struct CLI_Args {
    /// Display detailed help information.
    #[clap(short = 'h')]
    help: bool,

    /// Display brief help information.
    #[clap(short = '?')]
    help_brief: bool,

    /// Display version information.
    #[clap(short = 'v')]
    version: bool,

    /// Reset all subscription states; the value is reset-on-read.
    #[clap(
        short = 'g',
        value_name = "BOOL",
        value_parser = cli_parse_bool,
    )]
    reset_all: Option<bool>,

    /// Interactive use.
    #[clap(short = 'i')]
    interactive: bool,

    /// Marshal self test.
    #[clap(short = 'm')]
    marshal_test: bool,

    /// Provider interface.
    #[clap(short = 'p')]
    provider: bool,

    /// Reset one subscription state.
    #[clap(short = 'r')]
    reset: bool,

    /// Test mode.
    #[clap(short = 't')]
    test_mode: bool,

    /// Directory of state records.
    #[clap(
        long = "state-dir",
        value_name = "DIR",
        env = "LTM_STATE_DIR",
        default_value = STATE_DIR_DEFAULT,
    )]
    state_dir: String,

    /// Bytes one pass may consume.
    #[clap(
        long = "byte-budget",
        value_name = "N",
        value_parser = cli_parse_byte_budget,
        default_value_t = BYTE_BUDGET_DEFAULT,
    )]
    byte_budget: u64,

    /// Stop a pass after this many matched lines.
    #[clap(
        long = "max-matched-lines",
        value_name = "N",
        value_parser = cli_parse_count,
    )]
    max_matched_lines: Option<Count>,

    /// Encoding of log files.
    #[clap(
        long = "encoding",
        value_name = "LABEL",
        value_parser = cli_parse_encoding,
    )]
    encoding: Option<&'static Encoding>,
}

/// Parse a number that may be written as hex `0x`, octal `0o`, binary `0b`,
/// or decimal.
/// clap's built-in number parsing only takes decimal.
// XXX: clap Enhancement Issue https://github.com/clap-rs/clap/issues/4564
fn cli_process_radix(value: &str) -> std::result::Result<u64, String> {
    let parsed = if let Some(digits) = value.strip_prefix("0x") {
        u64::from_str_radix(digits, 16)
    } else if let Some(digits) = value.strip_prefix("0o") {
        u64::from_str_radix(digits, 8)
    } else if let Some(digits) = value.strip_prefix("0b") {
        u64::from_str_radix(digits, 2)
    } else {
        value.parse::<u64>()
    };
    match parsed {
        Ok(val) => Ok(val),
        Err(err) => Err(format!("Unable to parse a number from {:?} {}", value, err)),
    }
}

/// `clap` argument parser for `--byte-budget`.
fn cli_parse_byte_budget(value: &str) -> std::result::Result<u64, String> {
    let budget = cli_process_radix(value)?;
    if !(BYTE_BUDGET_MIN..=BYTE_BUDGET_MAX).contains(&budget) {
        return Err(format!(
            "--byte-budget must be {} ≤ N ≤ {}, it was {:?}",
            BYTE_BUDGET_MIN, BYTE_BUDGET_MAX, value
        ));
    }

    Ok(budget)
}

/// `clap` argument parser for `--max-matched-lines`.
fn cli_parse_count(value: &str) -> std::result::Result<Count, String> {
    match cli_process_radix(value)? {
        0 => Err(String::from("--max-matched-lines must be at least 1")),
        count => Ok(count),
    }
}

/// `clap` argument parser for `-g`.
fn cli_parse_bool(value: &str) -> std::result::Result<bool, String> {
    match parse_bool_like(value) {
        Some(val) => Ok(val),
        None => Err(format!("Invalid argument for -g ({}); expected 1, true, 0, or false", value)),
    }
}

/// `clap` argument parser for `--encoding`.
fn cli_parse_encoding(label: &str) -> std::result::Result<&'static Encoding, String> {
    match Encoding::for_label(label.as_bytes()) {
        Some(encoding) if encoding_supported(encoding) => Ok(encoding),
        Some(encoding) => Err(format!(
            "Unsupported encoding {} for {:?}; lines must end with the byte '\\n'",
            encoding.name(),
            label
        )),
        None => Err(format!("Unknown encoding label {:?}", label)),
    }
}

/// The one operation of this process, decided at startup.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Operation {
    Version,
    Help,
    HelpBrief,
    Interactive,
    MarshalTest,
    Provider,
    Reset,
    ResetAll(ResetPolicy),
}

/// Everything decided from the command-line.
#[derive(Debug)]
struct Settings {
    operation: Operation,
    state_dir: FPath,
    config: EngineConfig,
}

/// Decide the `Settings` from `args` (program name first).
///
/// `Err` holds the exit code after the problem was printed.
fn cli_process_args<I, T>(args: I) -> std::result::Result<Settings, u8>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let args: Vec<std::ffi::OsString> = args.into_iter().map(Into::into).collect();
    defn!("{:?}", args);
    // no arguments is a request for brief help
    if args.len() <= 1 {
        return Ok(Settings {
            operation: Operation::HelpBrief,
            state_dir: FPath::from(STATE_DIR_DEFAULT),
            config: EngineConfig::default(),
        });
    }
    let cli: CLI_Args = match CLI_Args::try_parse_from(args) {
        Ok(val) => val,
        Err(err) => {
            match err.kind() {
                ClapErrorKind::UnknownArgument => {
                    let arg: String = match err.get(ContextKind::InvalidArg) {
                        Some(ContextValue::String(s)) => s.clone(),
                        _ => String::new(),
                    };
                    eprintln!("{}: invalid option -- '{}'", NAME, arg.trim_start_matches('-'));
                }
                _ => {
                    let message: String = err.to_string();
                    let first_line: &str = message.lines().next().unwrap_or("");
                    eprintln!("{}: {}", NAME, first_line.trim_start_matches("error: "));
                }
            }
            println!("{}", CLI_HELP_BRIEF);
            defx!("clap error {:?}", err.kind());
            return Err(EXIT_LOGIC_ERROR);
        }
    };
    defo!("{:?}", cli);

    let operation: Operation = if cli.help {
        Operation::Help
    } else if cli.help_brief {
        Operation::HelpBrief
    } else {
        let mut operations: Vec<Operation> = Vec::with_capacity(1);
        if cli.version {
            operations.push(Operation::Version);
        }
        if let Some(reset_on_read) = cli.reset_all {
            operations.push(Operation::ResetAll(ResetPolicy::from_reset_on_read(reset_on_read)));
        }
        if cli.interactive {
            operations.push(Operation::Interactive);
        }
        if cli.marshal_test {
            operations.push(Operation::MarshalTest);
        }
        if cli.provider {
            operations.push(Operation::Provider);
        }
        if cli.reset {
            operations.push(Operation::Reset);
        }
        match operations.as_slice() {
            [operation] => *operation,
            [] => {
                eprintln!("{}: no operation given", NAME);
                println!("{}", CLI_HELP_BRIEF);
                defx!("no operation");
                return Err(EXIT_LOGIC_ERROR);
            }
            _ => {
                eprintln!("{}: only one operation may be given, got {:?}", NAME, operations);
                println!("{}", CLI_HELP_BRIEF);
                defx!("multiple operations");
                return Err(EXIT_LOGIC_ERROR);
            }
        }
    };

    let state_dir: FPath = match cli.test_mode {
        true => FPath::from(STATE_DIR_TEST_MODE),
        false => cli.state_dir,
    };
    let mut config = EngineConfig::default()
        .with_byte_budget(cli.byte_budget)
        .with_max_matched_lines(cli.max_matched_lines);
    if let Some(encoding) = cli.encoding {
        config = config.with_encoding(encoding);
    }
    let settings = Settings {
        operation,
        state_dir,
        config,
    };
    defx!("{:?}", settings);

    Ok(settings)
}

// --------------------
// operations

/// Exit code for an error from an operation.
fn exit_code_of(err: &anyhow::Error) -> u8 {
    if let Some(err_) = err.downcast_ref::<TailError>() {
        return err_.exit_code();
    }
    if err.downcast_ref::<MarshalError>().is_some() {
        return EXIT_PROTOCOL;
    }

    EXIT_UNEXPECTED
}

/// `-p`: read one `ReadRequest`, run one pass, write one `ReadResponse`.
///
/// A missing or unreadable log file still gets a zero-match response; the
/// exit code tells the two apart from success.
fn run_provider<R: Read, W: Write>(
    matcher: &TailMatcher,
    input: &mut R,
    output: &mut W,
) -> anyhow::Result<u8> {
    defn!();
    let request = ReadRequest::read_from(input).context("read request")?;
    defo!("{:?}", request);
    let (response, code) = match matcher.tail(&request.file_path, &request.subscription_id, &request.patterns) {
        Ok(result) => (ReadResponse::from_match_result(&result, matcher.config().byte_budget), EXIT_OK),
        Err(TailError::FileNotFound(path)) => {
            e_wrn!("log file not found {:?}", path);
            (ReadResponse::new_empty(&request), EXIT_FILE_NOT_FOUND)
        }
        Err(TailError::FileUnreadable(path, err)) => {
            e_wrn!("log file unreadable {:?}: {}", path, err);
            (ReadResponse::new_empty(&request), EXIT_FILE_UNREADABLE)
        }
        Err(err) => {
            defx!("{}", err);
            return Err(anyhow::Error::new(err)).context(format!("tail {:?}", request.file_path));
        }
    };
    response.write_to(output).context("write response")?;
    defx!("matched {}, exit {}", response.matched_line_count, code);

    Ok(code)
}

/// `-m`: echo a `MarshalTestRequest` back with synthesized matched lines.
fn run_marshal_test<R: Read, W: Write>(
    input: &mut R,
    output: &mut W,
) -> anyhow::Result<u8> {
    defn!();
    let test = MarshalTestRequest::read_from(input).context("read marshal test request")?;
    let response = ReadResponse::new_marshal_test(&test);
    response.write_to(output).context("write marshal test response")?;
    defx!("{} lines", response.matched_line_count);

    Ok(EXIT_OK)
}

/// `-r`: reset one subscription per a `ResetRequest`. Nothing is written
/// back. The log file need not exist.
fn run_reset<R: Read>(
    store: &StateStore,
    input: &mut R,
) -> anyhow::Result<u8> {
    defn!();
    let request = ResetRequest::read_from(input).context("read reset request")?;
    let subscription = Subscription::new(&request.subscription_id, &request.file_path);
    let policy = ResetPolicy::from_reset_on_read(request.is_reset_on_read());
    store
        .reset(&subscription, policy)
        .with_context(|| format!("reset {}", subscription))?;
    defx!("reset {} {}", subscription, policy);

    Ok(EXIT_OK)
}

/// `-g`: reset every subscription with a record.
fn run_reset_all(
    store: &StateStore,
    policy: ResetPolicy,
) -> anyhow::Result<u8> {
    defn!("({})", policy);
    let _count = store
        .reset_all(policy)
        .with_context(|| format!("reset all in {:?}", store.state_dir()))?;
    defx!("reset {}", _count);

    Ok(EXIT_OK)
}

/// Read one line without its line terminator; `None` at end of input.
fn prompt_line<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    prompt: &str,
) -> anyhow::Result<Option<String>> {
    write!(output, "{}", prompt)?;
    output.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let trimmed_len = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed_len);

    Ok(Some(line))
}

/// `-i`: prompt for a file, a subscription id and expressions, run one pass,
/// and print each match as `<indices>;<line>`.
fn run_interactive<R: BufRead, W: Write>(
    matcher: &TailMatcher,
    input: &mut R,
    output: &mut W,
) -> anyhow::Result<u8> {
    defn!();
    let file_path: FPath = match prompt_line(input, output, "Enter filename: ")? {
        Some(val) => val,
        None => return Ok(EXIT_OK),
    };
    writeln!(output, "  Filename: '{}'", file_path)?;
    let subscription_id: String = match prompt_line(input, output, "Enter subscription id: ")? {
        Some(val) => val,
        None => return Ok(EXIT_OK),
    };
    writeln!(output, "  Subscription id: '{}'", subscription_id)?;

    let mut patterns: Vec<PatternSpec> = Vec::new();
    loop {
        let index = patterns.len() as i32 + 1;
        let prompt = format!("Enter regular expression #{} (^D to end): ", index);
        let expression: String = match prompt_line(input, output, &prompt)? {
            Some(val) => val,
            None => break,
        };
        let spec = PatternSpec::new(index, &expression);
        match Pattern::compile(&spec) {
            Ok(_) => {
                writeln!(output, "  Expression #{}: '{}'", index, expression)?;
                patterns.push(spec);
            }
            Err(err) => {
                writeln!(output, "  Regular expression '{}' invalid; will be ignored", expression)?;
                defo!("{}", err);
            }
        }
    }
    writeln!(output)?;
    if patterns.is_empty() {
        writeln!(output, "  No valid regular expressions entered - exiting")?;
        return Ok(EXIT_OK);
    }
    writeln!(output, "  Processing with {} expressions", patterns.len())?;
    writeln!(output)?;

    let result = match matcher.tail(&file_path, &subscription_id, &patterns) {
        Ok(val) => val,
        Err(TailError::FileNotFound(path)) => {
            e_err!("file {:?} not found", path);
            return Ok(EXIT_OK);
        }
        Err(err) => return Err(anyhow::Error::new(err)),
    };
    writeln!(
        output,
        "Partial flag: {}",
        match result.was_partial_read {
            true => "True",
            false => "False",
        }
    )?;
    for matched_line in result.matched_lines.iter() {
        writeln!(output, "{}", matched_line)?;
    }
    output.flush()?;
    defx!("matched {}", result.matched_line_count());

    Ok(EXIT_OK)
}

/// Run the operation of `settings`; returns the process exit code.
fn run(settings: &Settings) -> u8 {
    defn!("{:?}", settings.operation);
    let store = StateStore::new(&settings.state_dir);
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let ret: anyhow::Result<u8> = match settings.operation {
        Operation::Version => {
            println!("{}", CLI_VERSION);
            Ok(EXIT_OK)
        }
        Operation::Help => {
            print!("{}", CLI_HELP);
            Ok(EXIT_OK)
        }
        Operation::HelpBrief => {
            println!("{}", CLI_HELP_BRIEF);
            Ok(EXIT_OK)
        }
        Operation::Interactive => {
            let matcher = TailMatcher::new(store, settings.config);
            run_interactive(&matcher, &mut stdin.lock(), &mut stdout.lock())
        }
        Operation::MarshalTest => run_marshal_test(&mut stdin.lock(), &mut stdout.lock()),
        Operation::Provider => {
            let matcher = TailMatcher::new(store, settings.config);
            run_provider(&matcher, &mut stdin.lock(), &mut stdout.lock())
        }
        Operation::Reset => run_reset(&store, &mut stdin.lock()),
        Operation::ResetAll(policy) => run_reset_all(&store, policy),
    };
    let code: u8 = match ret {
        Ok(code) => code,
        Err(err) => {
            e_err!("{}: {:#}", NAME, err);
            exit_code_of(&err)
        }
    };
    defx!("{}", code);

    code
}

pub fn main() -> ExitCode {
    if cfg!(debug_assertions) {
        stack_offset_set(Some(0));
    }
    defn!("allocator {}", ALLOCATOR_CHOSEN);
    let code: u8 = match cli_process_args(std::env::args_os()) {
        Ok(settings) => run(&settings),
        Err(code) => code,
    };
    defx!("exit code {}", code);

    ExitCode::from(code)
}

// --------------------
// tests
