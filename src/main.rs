// src/main.rs
//
// canbus-serial command line:
//
//   canbus-serial ports
//   canbus-serial monitor /dev/ttyACM0 [--json] [--decode]
//   canbus-serial send /dev/ttyACM0 "CanBus Tx 0x618 80 00 A0 0E 10 00 AA 00"
//   canbus-serial ctl /dev/ttyACM0 --enable --iac-max 16 --vout-max 360 --iout-max 17
//   canbus-serial request /dev/ttyACM0 active-faults

use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc;

use canbus_serial_lib::charger::{ChargerControl, ChargerMessage, ChargerRequest, RequestTarget};
use canbus_serial_lib::io::{
    parse_canbus_line, CallbackSink, EventSink, IoError, SerialTransport, SessionEvent,
    Transport, TransportSession,
};
use canbus_serial_lib::logging::{init_file_logging, stop_file_logging};
use canbus_serial_lib::settings::{load_settings, BridgeSettings};
use canbus_serial_lib::tlog;

/// CTL must be refreshed at least this often or the charger drops out
const CTL_PERIOD: Duration = Duration::from_millis(100);

/// Serial CAN-bus bridge for `CanBus Rx/Tx` text adapters
#[derive(Parser)]
#[command(name = "canbus-serial")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Settings file (.json or .toml); defaults to the user config dir
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured baud rate
    #[arg(short, long, global = true)]
    baud: Option<u32>,

    /// Mirror log output into this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports present on this host
    Ports,

    /// Print frames and connection events until Ctrl-C
    Monitor {
        /// Serial port (falls back to the configured port)
        port: Option<String>,

        /// One JSON object per event
        #[arg(long)]
        json: bool,

        /// Decode charger packets
        #[arg(long)]
        decode: bool,
    },

    /// Send one raw line (a newline is appended)
    Send {
        port: String,
        line: String,
    },

    /// Build and send a charger CTL (0x618) packet
    Ctl {
        port: String,

        /// Set CanEnable
        #[arg(long)]
        enable: bool,

        /// Set LED3
        #[arg(long)]
        led3: bool,

        /// Max AC input current [A]
        #[arg(long, default_value_t = 0.0)]
        iac_max: f32,

        /// Max output voltage [V]
        #[arg(long, default_value_t = 0.0)]
        vout_max: f32,

        /// Max output current [A]
        #[arg(long, default_value_t = 0.0)]
        iout_max: f32,

        /// Number of packets to send, 100ms apart
        #[arg(long, default_value_t = 1)]
        count: u32,
    },

    /// Send a diagnostic request (REQ 0x61B) and print the replies
    Request {
        port: String,

        #[arg(value_enum)]
        target: RequestArg,

        /// How long to wait for replies [ms]
        #[arg(long, default_value_t = 1000)]
        timeout_ms: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RequestArg {
    ActiveFaults,
    InactiveFaults,
    Software,
    Serial,
}

impl From<RequestArg> for RequestTarget {
    fn from(arg: RequestArg) -> Self {
        match arg {
            RequestArg::ActiveFaults => RequestTarget::FaultActive,
            RequestArg::InactiveFaults => RequestTarget::FaultInactive,
            RequestArg::Software => RequestTarget::SoftwareVersion,
            RequestArg::Serial => RequestTarget::SerialNumber,
        }
    }
}

#[derive(Clone, Copy)]
struct MonitorOptions {
    json: bool,
    decode: bool,
}

fn main() {
    let cli = Cli::parse();
    let result = run(cli);
    stop_file_logging();

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let mut settings = load_settings(cli.config.as_deref())?;
    if let Some(baud) = cli.baud {
        settings.baud_rate = baud;
    }
    if let Some(dir) = cli.log_dir {
        settings.log_dir = Some(dir);
    }
    settings.validate()?;

    if let Some(dir) = &settings.log_dir {
        init_file_logging(dir)?;
    }

    match cli.command {
        Commands::Ports => run_ports(),
        Commands::Monitor { port, json, decode } => {
            let port = port
                .or_else(|| settings.port.clone())
                .ok_or_else(|| "No port given and none configured".to_string())?;
            run_monitor(&settings, &port, MonitorOptions { json, decode })
        }
        Commands::Send { port, line } => run_send(&settings, &port, &line),
        Commands::Ctl {
            port,
            enable,
            led3,
            iac_max,
            vout_max,
            iout_max,
            count,
        } => {
            let ctl = ChargerControl {
                can_enable: enable,
                led3_enable: led3,
                iac_max_a: iac_max,
                vout_max_v: vout_max,
                iout_max_a: iout_max,
            };
            run_ctl(&settings, &port, ctl, count)
        }
        Commands::Request {
            port,
            target,
            timeout_ms,
        } => run_request(
            &settings,
            &port,
            target.into(),
            Duration::from_millis(timeout_ms),
        ),
    }
}

// ============================================================================
// Commands
// ============================================================================

fn run_ports() -> Result<(), String> {
    let ports = SerialTransport.list_endpoints().map_err(|e| e.to_string())?;
    if ports.is_empty() {
        eprintln!("No serial ports found");
    }
    for port in ports {
        println!("{}", port);
    }
    Ok(())
}

fn open_session(
    settings: &BridgeSettings,
    port: &str,
    sink: Arc<dyn EventSink>,
) -> Result<TransportSession, String> {
    let session = TransportSession::new(
        Arc::new(SerialTransport),
        sink,
        settings.to_session_config(),
    );
    session
        .connect(port, &settings.to_link_config())
        .map_err(|e| e.to_string())?;
    Ok(session)
}

/// Sink for the one-shot commands: report connection changes and errors only
fn log_event(event: SessionEvent) {
    match event {
        SessionEvent::FrameReceived { .. } => {}
        SessionEvent::ConnectionStatusChanged { description, .. } => {
            tlog!("cli"; "{}", description);
        }
        SessionEvent::ErrorRaised { description } => {
            tlog!("cli"; "Error: {}", description);
        }
    }
}

fn run_send(settings: &BridgeSettings, port: &str, line: &str) -> Result<(), String> {
    if let Err(e) = parse_canbus_line(line) {
        tlog!("cli"; "Warning: {:?} is not a CanBus frame line ({})", line, e);
    }

    let session = open_session(settings, port, Arc::new(CallbackSink(log_event)))?;
    let result = session.send(line).map_err(|e| e.to_string());
    session.stop();
    result
}

fn run_ctl(
    settings: &BridgeSettings,
    port: &str,
    ctl: ChargerControl,
    count: u32,
) -> Result<(), String> {
    let frame = ctl.to_frame();
    println!("{}", frame);

    let session = open_session(settings, port, Arc::new(CallbackSink(log_event)))?;
    let mut result = Ok(());
    for i in 0..count {
        if let Err(e) = session.send_frame(&frame) {
            result = Err(e.to_string());
            break;
        }
        if i + 1 < count {
            std::thread::sleep(CTL_PERIOD);
        }
    }
    session.stop();
    result
}

fn run_request(
    settings: &BridgeSettings,
    port: &str,
    target: RequestTarget,
    timeout: Duration,
) -> Result<(), String> {
    let (tx, rx) = std_mpsc::channel::<SessionEvent>();
    let session = open_session(settings, port, Arc::new(tx))?;

    let frame = ChargerRequest::new(target).to_frame();
    tlog!("cli"; "Requesting {}: {}", target, frame.raw_text);
    let result = session
        .send_frame(&frame)
        .map_err(|e| e.to_string())
        .and_then(|()| collect_replies(&rx, target, timeout));
    session.stop();
    result
}

/// Print replies on the target's ID until the report is complete or the
/// timeout passes. No reply at all is an error.
fn collect_replies(
    rx: &std_mpsc::Receiver<SessionEvent>,
    target: RequestTarget,
    timeout: Duration,
) -> Result<(), String> {
    let deadline = Instant::now() + timeout;
    let mut replies = 0usize;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let event = match rx.recv_timeout(remaining) {
            Ok(event) => event,
            Err(_) if replies > 0 => return Ok(()),
            Err(_) => {
                return Err(format!(
                    "No {} reply within {}ms",
                    target,
                    timeout.as_millis()
                ))
            }
        };

        match event {
            SessionEvent::FrameReceived { frame } if frame.identifier == target.response_id() => {
                replies += 1;
                println!("{}", frame);
                match ChargerMessage::decode(&frame) {
                    Some(Ok(message)) => {
                        println!("    {}", message);
                        if report_complete(&message, replies) {
                            return Ok(());
                        }
                    }
                    Some(Err(e)) => println!("    decode error: {}", e),
                    None => {}
                }
            }
            SessionEvent::ConnectionStatusChanged {
                connected: false,
                description,
            } => return Err(description),
            SessionEvent::ErrorRaised { description } => {
                tlog!("cli"; "Error: {}", description);
            }
            _ => {}
        }
    }
}

/// Faults come one frame each; everything else is a single reply
fn report_complete(message: &ChargerMessage, replies: usize) -> bool {
    match message {
        ChargerMessage::Flta(fault) | ChargerMessage::Fltp(fault) => match &fault.record {
            None => true,
            Some(record) => replies >= usize::from(record.total_errors).max(1),
        },
        _ => true,
    }
}

// ============================================================================
// Monitor
// ============================================================================

fn run_monitor(settings: &BridgeSettings, port: &str, options: MonitorOptions) -> Result<(), String> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start runtime: {}", e))?;
    runtime.block_on(monitor(settings, port, options))
}

async fn monitor(settings: &BridgeSettings, port: &str, options: MonitorOptions) -> Result<(), String> {
    let (tx, mut rx) = mpsc::unbounded_channel::<SessionEvent>();
    let session = open_session(settings, port, Arc::new(tx))?;
    tlog!("monitor"; "Listening on {} (Ctrl-C to stop)", port);

    let mut lost = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tlog!("monitor"; "Interrupted, stopping");
                break;
            }
            event = rx.recv() => {
                let Some(event) = event else { break };
                if !print_event(&event, options) {
                    lost = true;
                    break;
                }
            }
        }
    }

    // stop() joins the worker thread; keep that off the async executor
    tokio::task::block_in_place(|| session.stop());
    while let Ok(event) = rx.try_recv() {
        print_event(&event, options);
    }

    if lost {
        Err(format!("Connection to {} lost", port))
    } else {
        Ok(())
    }
}

/// Print one event. Returns false once the connection has gone down.
fn print_event(event: &SessionEvent, options: MonitorOptions) -> bool {
    let decoded = match event {
        SessionEvent::FrameReceived { frame } if options.decode => ChargerMessage::decode(frame),
        _ => None,
    };

    if options.json {
        print_json(event, decoded);
    } else {
        print_text(event, decoded);
    }

    !matches!(
        event,
        SessionEvent::ConnectionStatusChanged { connected: false, .. }
    )
}

fn print_json(
    event: &SessionEvent,
    decoded: Option<Result<ChargerMessage, IoError>>,
) {
    let mut value = match serde_json::to_value(event) {
        Ok(value) => value,
        Err(e) => {
            tlog!("monitor"; "Failed to serialize event: {}", e);
            return;
        }
    };

    if let (Some(decoded), Some(object)) = (decoded, value.as_object_mut()) {
        match decoded {
            Ok(message) => match serde_json::to_value(message) {
                Ok(v) => {
                    object.insert("decoded".to_string(), v);
                }
                Err(e) => tlog!("monitor"; "Failed to serialize packet: {}", e),
            },
            Err(e) => {
                object.insert("decode_error".to_string(), serde_json::Value::String(e.to_string()));
            }
        }
    }

    println!("{}", value);
}

fn print_text(
    event: &SessionEvent,
    decoded: Option<Result<ChargerMessage, IoError>>,
) {
    match event {
        SessionEvent::FrameReceived { frame } => {
            println!("{}", frame);
            match decoded {
                Some(Ok(message)) => println!("    {}", message),
                Some(Err(e)) => println!("    decode error: {}", e),
                None => {}
            }
        }
        SessionEvent::ConnectionStatusChanged { description, .. } => {
            println!("-- {}", description);
        }
        SessionEvent::ErrorRaised { description } => {
            tlog!("monitor"; "{}", description);
        }
    }
}
