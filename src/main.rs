use mdasp_companion::domain::models::{AppEvent, MessageSeverity};
use mdasp_companion::domain::settings::SettingsService;
use mdasp_companion::infrastructure::bluetooth::transport::DeviceHandle;
use mdasp_companion::infrastructure::logging;
use tracing::{error, info, warn};

/// What the process was asked to do
#[cfg_attr(not(windows), allow(dead_code))]
enum Mode {
    /// List nearby boards and exit
    Scan,
    /// Connect to this board, or to the strongest one found by a scan
    Connect(Option<DeviceHandle>),
}

fn main() -> anyhow::Result<()> {
    let settings_service = SettingsService::new()?;

    let _logging_guard = logging::init_logger(&settings_service.get().log_settings)
        .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
        .ok();

    info!("Starting MDASP Companion");
    info!("Settings loaded from {}", settings_service.path().display());

    let mode = match std::env::args().nth(1).as_deref() {
        Some("scan") => Mode::Scan,
        Some(arg) => Mode::Connect(Some(arg.parse::<DeviceHandle>()?)),
        None => Mode::Connect(
            settings_service
                .get()
                .last_connected_address
                .map(DeviceHandle),
        ),
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    rt.block_on(run(settings_service, mode))
}

#[cfg_attr(not(windows), allow(dead_code))]
fn log_event(event: &AppEvent) {
    match event {
        AppEvent::ConnectionStatus(status) => info!("Connection status: {:?}", status),
        AppEvent::ParametersUpdated(record) => info!(
            "Device parameters: eq passthrough={} compressor passthrough={} volume={:.1} dB delay={} ms",
            record.eq.passthrough, record.compressor.passthrough, record.volume, record.delay
        ),
        AppEvent::DeviceFound(device) => info!(
            "Found {} at {} ({} dBm)",
            device.name,
            DeviceHandle(device.address),
            device.signal_strength
        ),
        AppEvent::LogMessage(msg) => match msg.severity {
            MessageSeverity::Error => error!("{}", msg.message),
            MessageSeverity::Warning => warn!("{}", msg.message),
            MessageSeverity::Info | MessageSeverity::Success => info!("{}", msg.message),
        },
    }
}

#[cfg(windows)]
async fn scan(
    settings: &mdasp_companion::domain::settings::Settings,
    app_tx: &tokio::sync::mpsc::UnboundedSender<AppEvent>,
    app_rx: &mut tokio::sync::mpsc::UnboundedReceiver<AppEvent>,
) -> anyhow::Result<mdasp_companion::domain::discovery::DiscoveredDevices> {
    use mdasp_companion::domain::discovery::{DeviceFilter, DiscoveredDevices};
    use mdasp_companion::infrastructure::bluetooth::scanner::BleScanner;
    use std::time::Duration;

    let mut scanner = BleScanner::new(app_tx.clone());
    scanner.start(
        settings.ble_service_uuid,
        DeviceFilter {
            name: settings.device_name_filter.clone(),
            show_all: settings.debug_show_all_devices,
        },
    )?;

    let mut devices = DiscoveredDevices::new();
    let deadline = tokio::time::sleep(Duration::from_secs(settings.scan_duration_secs));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            Some(event) = app_rx.recv() => {
                if let AppEvent::DeviceFound(device) = &event {
                    if !devices.upsert(device.clone()) {
                        continue;
                    }
                }
                log_event(&event);
            }
        }
    }
    scanner.stop()?;
    info!("Scan finished, {} device(s) found", devices.len());
    Ok(devices)
}

#[cfg(windows)]
async fn run(mut settings_service: SettingsService, mode: Mode) -> anyhow::Result<()> {
    use mdasp_companion::domain::models::ConnectionStatus;
    use mdasp_companion::infrastructure::bluetooth::connection::{ConnectionConfig, WinRtTransport};
    use mdasp_companion::infrastructure::bluetooth::service::SessionConfig;
    use mdasp_companion::infrastructure::bluetooth::BluetoothService;
    use mdasp_companion::presentation::console::{self, Command};
    use std::sync::Arc;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::sync::mpsc;

    let settings = settings_service.get().clone();
    let (app_tx, mut app_rx) = mpsc::unbounded_channel();

    let address = match mode {
        Mode::Connect(Some(address)) => address,
        Mode::Connect(None) => {
            let devices = scan(&settings, &app_tx, &mut app_rx).await?;
            let Some(device) = devices.strongest() else {
                anyhow::bail!(
                    "No MDASP device found. Usage: mdasp_companion [scan | <bluetooth-address>]"
                );
            };
            DeviceHandle(device.address)
        }
        Mode::Scan => {
            let devices = scan(&settings, &app_tx, &mut app_rx).await?;
            for device in devices.by_signal_strength() {
                println!(
                    "{}  {:>4} dBm  {}",
                    DeviceHandle(device.address),
                    device.signal_strength,
                    device.name
                );
            }
            return Ok(());
        }
    };

    let (transport_tx, mut transport_rx) = mpsc::unbounded_channel();
    let transport = Arc::new(WinRtTransport::new(
        transport_tx,
        ConnectionConfig {
            service_uuid: settings.ble_service_uuid,
            parameter_char_uuid: settings.ble_parameter_char_uuid,
        },
    )?);
    let mut service = BluetoothService::new(transport, app_tx, SessionConfig::from(&settings));
    service.connect(address)?;
    println!("Type `help` for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            Some(event) = transport_rx.recv() => service.handle_event(event),
            Some(event) = app_rx.recv() => {
                log_event(&event);
                if let AppEvent::ConnectionStatus(ConnectionStatus::Connected) = event {
                    if let Err(e) = settings_service.remember_device(address.0) {
                        warn!("Failed to save settings: {}", e);
                    }
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let command = match console::parse_command(line) {
                        Ok(command) => command,
                        Err(e) => {
                            println!("{}", e);
                            continue;
                        }
                    };
                    if command == Command::Quit {
                        service.disconnect();
                        break;
                    }
                    if let Command::Live(enabled) = command {
                        settings_service.get_mut().live_mode = enabled;
                        if let Err(e) = settings_service.save() {
                            warn!("Failed to save settings: {}", e);
                        }
                    }
                    match console::execute(&mut service, command) {
                        Ok(reply) => println!("{}", reply),
                        Err(e) => println!("Error: {:#}", e),
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!("Console input closed: {}", e);
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                service.disconnect();
                break;
            }
        }
    }

    Ok(())
}

#[cfg(not(windows))]
async fn run(_settings_service: SettingsService, mode: Mode) -> anyhow::Result<()> {
    match mode {
        Mode::Connect(Some(address)) => {
            anyhow::bail!("No BLE backend available on this platform (device {})", address)
        }
        _ => anyhow::bail!("No BLE backend available on this platform"),
    }
}
