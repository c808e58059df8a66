//! Host-side OBD-II client: drives `obd2-core`'s connection state machine,
//! PID manager and sanity checker against a TCP ELM327 dongle, logging
//! decoded values to stdout. This binary is a thin composition root — it
//! owns no decoding logic of its own.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use clap::Parser;
use obd2_core::clock::Clock;
use obd2_core::error::LogErrorSink;
use obd2_core::frame::{Frame, MODE_01_LIVE_DATA};
use obd2_core::pid::{PidManager, PidValue};
use obd2_core::sanity::{SanityCheck, SanityResult};
use obd2_core::state_machine::{Event, State, StateConfig, StateConfigTable, StateMachine};

#[derive(Parser, Debug)]
#[command(about = "Poll live OBD-II PIDs from an ELM327-compatible dongle")]
struct Args {
    /// Address of the ELM327 dongle, host:port
    #[arg(default_value = "127.0.0.1:35000")]
    address: String,

    /// How long to poll for, in seconds (0 = forever)
    #[arg(long, default_value_t = 0)]
    duration: u64,
}

struct SystemClock(Instant);

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        u32::try_from(self.0.elapsed().as_millis()).unwrap_or(u32::MAX)
    }
}

fn default_state_configs(timeout_ms: u32, max_retries: u8) -> StateConfigTable {
    std::array::from_fn(|_| StateConfig { timeout_ms, max_retries, on_entry: None, on_exit: None })
}

/// Reads bytes until the ELM327 `>` prompt, returning everything before it.
fn read_until_prompt(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut out = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match stream.read(&mut byte)? {
            0 => break,
            _ => {
                if byte[0] == b'>' {
                    break;
                }
                out.push(byte[0]);
            }
        }
    }
    Ok(String::from_utf8_lossy(&out).to_string())
}

fn send_command(stream: &mut TcpStream, command: &str) -> std::io::Result<String> {
    stream.write_all(command.as_bytes())?;
    stream.write_all(b"\r")?;
    read_until_prompt(stream)
}

fn initialize_elm327(stream: &mut TcpStream) -> std::io::Result<()> {
    for cmd in ["ATZ", "ATE0", "ATL0", "ATS0", "ATSP0"] {
        let response = send_command(stream, cmd)?;
        log::debug!("{cmd} -> {}", response.trim());
    }
    Ok(())
}

/// Parses a `41{pid}{data...}` mode-0x01 response (ELM327 may have mixed in
/// spaces or a trailing newline) into a [`Frame`].
fn parse_mode01_response(response: &str) -> Option<Frame> {
    let cleaned: String = response.chars().filter(|c| c.is_ascii_hexdigit()).collect();
    let bytes = hex::decode(&cleaned).ok()?;
    if bytes.len() < 2 || bytes[0] != 0x41 {
        return None;
    }
    let pid = bytes[1];
    let data = &bytes[2..];
    Some(Frame::new(MODE_01_LIVE_DATA, pid, data, true))
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let mut stream = match TcpStream::connect(&args.address) {
        Ok(s) => s,
        Err(e) => {
            log::error!("failed to connect to {}: {e}", args.address);
            std::process::exit(1);
        }
    };

    let start = Instant::now();
    let mut error_sink = LogErrorSink;

    let mut state_machine = StateMachine::new(
        SystemClock(Instant::now()),
        None::<fn(State, State, Event)>,
        default_state_configs(5000, 3),
    );
    let _ = state_machine.process_event(Event::ConnectRequest, &mut error_sink);
    let _ = state_machine.process_event(Event::Connected, &mut error_sink);

    if let Err(e) = initialize_elm327(&mut stream) {
        log::error!("ELM327 initialization failed: {e}");
        let _ = state_machine.process_event(Event::ElmInitFailed, &mut error_sink);
        std::process::exit(1);
    }
    let _ = state_machine.process_event(Event::ElmInitComplete, &mut error_sink);
    let _ = state_machine.process_event(Event::ProtocolDetected, &mut error_sink);
    let _ = state_machine.process_event(Event::HandshakeComplete, &mut error_sink);
    log::info!("connection state: {:?}", state_machine.current_state());

    let mut pid_manager = PidManager::new(SystemClock(Instant::now()), None::<fn(u8, &PidValue)>);
    let mut sanity = SanityCheck::new(SystemClock(Instant::now()), Some(LogErrorSink), false);

    match send_command(&mut stream, "0100") {
        Ok(response) => match parse_mode01_response(&response) {
            Some(frame) if frame.data_length() == 4 => {
                let mut bytes = [0u8; 4];
                bytes.copy_from_slice(frame.data());
                if pid_manager.set_supported(bytes, 0).is_ok() {
                    log::info!("PID support discovered, {} PIDs supported", pid_manager.supported_count());
                }
            }
            _ => log::warn!("unexpected response to 0100: {}", response.trim()),
        },
        Err(e) => log::warn!("failed to query supported PIDs: {e}"),
    }

    for pid in [0x0Cu8, 0x0D, 0x05, 0x04] {
        if pid_manager.is_supported(pid) {
            if let Some(def) = obd2_core::pid::find_definition(pid) {
                let _ = pid_manager.enable(pid, def.default_rate_ms);
                log::info!("polling {} (PID {pid:02X}) every {}ms", def.name, def.default_rate_ms);
            }
        }
    }

    loop {
        if args.duration > 0 && start.elapsed() >= Duration::from_secs(args.duration) {
            break;
        }

        let Some(pid) = pid_manager.next_pid_to_read() else {
            std::thread::sleep(Duration::from_millis(20));
            continue;
        };

        let command = format!("01{pid:02X}");
        let response = match send_command(&mut stream, &command) {
            Ok(r) => r,
            Err(e) => {
                log::error!("read error: {e}");
                break;
            }
        };

        let Some(frame) = parse_mode01_response(&response) else {
            log::warn!("could not parse response to {command}: {}", response.trim());
            continue;
        };

        if pid_manager.process_frame(&frame).is_err() {
            continue;
        }

        if let Ok(value) = pid_manager.get_value(pid) {
            match sanity.validate_pid(pid, value.eng_value, value.valid) {
                SanityResult::Ok => {
                    log::info!("PID {pid:02X} = {:.2}{}", value.eng_value, value.unit);
                }
                result => {
                    log::warn!(
                        "PID {pid:02X} reading {:.2} failed sanity check: {result:?}",
                        value.eng_value
                    );
                }
            }
        }
    }

    log::info!("done");
}
