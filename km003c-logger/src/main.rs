use anyhow::{Context, Result};
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use km003c_driver::{
    AdcQueueEntry, Attribute, KMError, PayloadRecord, SampleRate, Session, Transport, TransportConfig, UsbTransport,
};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const CSV_HEADER: [&str; 7] = ["timestamp_ms", "vbus_µV", "ibus_µA", "vcc1_mV", "vcc2_mV", "vdp_mV", "vdm_mV"];

/// Stream ADC queue samples from a POWER-Z KM003C into a CSV file.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// CSV file to write samples to.
    #[arg(required_unless_present = "dump")]
    output: Option<PathBuf>,
    /// Sample rate: 0 = 2 SPS, 1 = 10 SPS, 2 = 50 SPS, 3 = 1 kSPS.
    #[arg(short, long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=3))]
    rate: u8,
    /// Delay between polls in milliseconds.
    #[arg(short, long, default_value_t = 0)]
    interval_ms: u64,
    /// Stop after this many samples (records in dump mode).
    #[arg(short = 'n', long)]
    count: Option<u64>,
    /// Deadline for each USB transfer in milliseconds, 0 waits forever.
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,
    /// Print decoded ADC snapshots and queue entries instead of writing CSV.
    #[arg(long)]
    dump: bool,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(short, long)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

fn setup_logging(log_file_path: Option<&Path>, verbosity: &Verbosity<InfoLevel>) -> Result<Option<WorkerGuard>> {
    // stdout is reserved for --dump output
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();

    let (file_layer, guard) = if let Some(path) = log_file_path {
        let log_file =
            File::create(path).with_context(|| format!("Failed to create log file at: {:?}", path))?;
        let (non_blocking_writer, guard) = tracing_appender::non_blocking(log_file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false)
            .with_target(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let Some(path) = log_file_path {
        info!("Logging to file: {:?}", path);
    }

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = setup_logging(cli.log_file.as_deref(), &cli.verbose)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, shutting down gracefully.");
            flag.store(true, Ordering::Relaxed);
        }
    });

    // the session API blocks, keep it off the async worker
    let result = tokio::task::spawn_blocking(move || run(&cli, &shutdown))
        .await
        .context("Logger task panicked")?;
    if let Err(e) = &result {
        error!("Logger failed: {:?}", e);
    }
    result
}

fn run(cli: &Cli, shutdown: &AtomicBool) -> Result<()> {
    let rate = SampleRate::try_from(cli.rate).context("Invalid sample rate")?;
    let config = TransportConfig {
        timeout: (cli.timeout_ms > 0).then(|| Duration::from_millis(cli.timeout_ms)),
        ..TransportConfig::default()
    };

    let transport = UsbTransport::open(config).context("Failed to open POWER-Z KM003C")?;
    debug!(config = ?transport.config(), "Transport ready");
    let mut session = Session::new(transport);
    session.connect().context("Connection handshake failed")?;
    stop_acquisition(&mut session)?;
    session.set_rate(rate).context("Failed to set sample rate")?;

    let outcome = match &cli.output {
        Some(path) if !cli.dump => log_csv(&mut session, path, cli, shutdown),
        _ => dump_records(&mut session, cli, shutdown),
    };

    if let Err(e) = stop_acquisition(&mut session) {
        warn!("{:#}", e);
    }
    session.disconnect();
    outcome
}

/// Acquisition must be stopped before the rate can change. A device that is
/// idle may refuse, which is harmless.
fn stop_acquisition<T: Transport>(session: &mut Session<T>) -> Result<()> {
    match session.stop() {
        Ok(()) => Ok(()),
        Err(KMError::CommandRejected(header)) => {
            warn!(%header, "Device refused STOP");
            Ok(())
        }
        Err(e) => Err(e).context("Failed to stop acquisition"),
    }
}

fn log_csv<T: Transport>(session: &mut Session<T>, path: &Path, cli: &Cli, shutdown: &AtomicBool) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).with_context(|| format!("Failed to create {:?}", path))?;
    writer.write_record(CSV_HEADER)?;
    writer.flush()?;
    info!(output = ?path, "--- Entering Data Polling Loop ---");

    let mut rows = 0u64;
    while !shutdown.load(Ordering::Relaxed) {
        let entries = session.get_adc_queue()?;
        for entry in &entries {
            writer.write_record(csv_row(entry))?;
            rows += 1;
            if limit_reached(cli.count, rows) {
                break;
            }
        }
        writer.flush()?;
        debug!(samples = entries.len(), total = rows, "Polled ADC queue");

        if limit_reached(cli.count, rows) {
            break;
        }
        pause(cli.interval_ms);
    }

    info!(rows, "Finished logging");
    Ok(())
}

fn dump_records<T: Transport>(session: &mut Session<T>, cli: &Cli, shutdown: &AtomicBool) -> Result<()> {
    let mask = u16::from(Attribute::Adc) | u16::from(Attribute::AdcQueue);
    let mut printed = 0u64;
    while !shutdown.load(Ordering::Relaxed) && !limit_reached(cli.count, printed) {
        for record in session.get_data(mask)? {
            match record {
                PayloadRecord::Adc(snapshot) => println!("{}", snapshot),
                PayloadRecord::AdcQueue(entries) => entries.iter().for_each(|entry| println!("{}", entry)),
                PayloadRecord::Unknown { attribute, data } => println!("{}", unknown_line(attribute, &data)),
            }
            printed += 1;
        }
        pause(cli.interval_ms);
    }
    Ok(())
}

fn limit_reached(limit: Option<u64>, done: u64) -> bool {
    limit.is_some_and(|limit| done >= limit)
}

fn pause(interval_ms: u64) {
    if interval_ms > 0 {
        std::thread::sleep(Duration::from_millis(interval_ms));
    }
}

fn unknown_line(attribute: u16, data: &[u8]) -> String {
    format!("attribute {:#06x}: {}", attribute, hex::encode(data))
}

/// CC voltages are stored in 0.1 mV and written in mV.
fn csv_row(entry: &AdcQueueEntry) -> [String; 7] {
    [
        entry.timestamp_ms.to_string(),
        entry.vbus_uv.to_string(),
        entry.ibus_ua.to_string(),
        format!("{:.1}", entry.vcc1_mv()),
        format!("{:.1}", entry.vcc2_mv()),
        entry.vdp_mv.to_string(),
        entry.vdm_mv.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_row_converts_cc_to_millivolts() {
        let entry = AdcQueueEntry {
            timestamp_ms: 1234,
            vbus_uv: 5_082_025,
            ibus_ua: -46,
            vcc1_tenth_mv: 572,
            vcc2_tenth_mv: 32_350,
            vdp_mv: 600,
            vdm_mv: 0,
        };
        assert_eq!(
            csv_row(&entry),
            ["1234", "5082025", "-46", "57.2", "3235.0", "600", "0"].map(String::from)
        );
    }

    #[test]
    fn csv_header_has_seven_columns() {
        assert_eq!(CSV_HEADER.len(), csv_row(&AdcQueueEntry::default()).len());
        assert_eq!(CSV_HEADER[1], "vbus_µV");
    }

    #[test]
    fn rate_is_limited_to_four_codes() {
        assert!(Cli::try_parse_from(["km003c-logger", "out.csv", "--rate", "3"]).is_ok());
        assert!(Cli::try_parse_from(["km003c-logger", "out.csv", "--rate", "4"]).is_err());
    }

    #[test]
    fn output_is_optional_only_for_dump() {
        assert!(Cli::try_parse_from(["km003c-logger"]).is_err());
        let cli = Cli::try_parse_from(["km003c-logger", "--dump", "-n", "5"]).unwrap();
        assert!(cli.output.is_none());
        assert_eq!(cli.count, Some(5));
    }

    #[test]
    fn unknown_record_is_printed_as_hex() {
        assert_eq!(unknown_line(0x10, &[0xde, 0xad, 0x01]), "attribute 0x0010: dead01");
    }

    #[test]
    fn sample_limit() {
        assert!(!limit_reached(None, u64::MAX));
        assert!(!limit_reached(Some(10), 9));
        assert!(limit_reached(Some(10), 10));
    }
}
