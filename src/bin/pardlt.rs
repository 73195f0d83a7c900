use chrono::{Local, TimeZone};
use clap::{Arg, ArgAction, Command};
use pardlt::dlt::Record;
use pardlt::source::ByteSource;
use pardlt::supervisor::Supervisor;
use pardlt::utils::utc_time_from_us;
use slog::{info, o, Drain};
use std::io::Write;

static LOG_LEVEL_STRS: [&str; 7] = ["", "fatal", "error", "warn", "info", "debug", "verbose"];
static TRACE_TYPE_STRS: [&str; 6] = ["", "variable", "func_in", "func_out", "state", "vfb"];
static NW_TYPE_STRS: [&str; 5] = ["", "ipc", "can", "flexray", "most"];
static CONTROL_TYPE_STRS: [&str; 4] = ["", "request", "response", "time"];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = Command::new("pardlt")
        .version(clap::crate_version!())
        .about("Parse automotive diagnostic log and trace (DLT) files in parallel.")
        .arg(Arg::new("file").required(true).help("DLT file to parse"))
        .arg(
            Arg::new("mmap")
                .long("mmap")
                .action(ArgAction::SetTrue)
                .help("memory-map the input instead of pre-loading it"),
        )
        .arg(
            Arg::new("threads")
                .long("threads")
                .short('t')
                .value_parser(clap::value_parser!(usize))
                .help("number of worker threads (default: hardware parallelism)"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("print records as JSON, one object per line"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .action(ArgAction::Count)
                .help("verbosity level"),
        )
        .get_matches();

    // by default we do output: Critical, Error, Warning
    // -v +Info -vv +Debug -vvv +Trace
    let min_log_level = match matches.get_count("verbose") {
        0 => slog::Level::Warning,
        1 => slog::Level::Info,
        2 => slog::Level::Debug,
        _ => slog::Level::Trace,
    };
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::CompactFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain)
        .build()
        .filter_level(min_log_level)
        .fuse();
    let log = slog::Logger::root(
        drain,
        o!("version"=>clap::crate_version!(), "log_level"=>format!("{}", min_log_level)),
    );

    let file = matches
        .get_one::<String>("file")
        .expect("file is a required argument");
    let source = if matches.get_flag("mmap") {
        ByteSource::mapped(file)?
    } else {
        ByteSource::precached(file)?
    };
    info!(log, "opened {}", file; "bytes" => source.len(), "mmap" => matches.get_flag("mmap"));

    let supervisor = match matches.get_one::<usize>("threads") {
        Some(&workers) => Supervisor::with_workers(source, workers)?,
        None => Supervisor::new(source)?,
    };
    let records = supervisor.with_logger(log.clone()).execute()?;

    let mut writer = std::io::BufWriter::new(std::io::stdout());
    if matches.get_flag("json") {
        for record in &records {
            serde_json::to_writer(&mut writer, record)?;
            writeln!(writer)?;
        }
    } else {
        for (index, record) in records.iter().enumerate() {
            write_record(&mut writer, index, record)?;
        }
    }
    writer.flush()?;
    info!(log, "parsed {} records", records.len());
    Ok(())
}

fn write_record(
    writer: &mut impl Write,
    index: usize,
    record: &Record,
) -> Result<(), std::io::Error> {
    if let Some(cause) = record.corruption_cause() {
        return writeln!(writer, "{} [corrupted: {}]", index, cause);
    }
    writeln!(
        writer,
        "{index} {reception_time} {tmsp:10} {mcnt:03} {ecu:-<4} {apid:-<4} {ctid:-<4} {kind} {message}",
        index = index,
        reception_time = Local
            .from_utc_datetime(&utc_time_from_us(record.timestamp()))
            .format("%Y/%m/%d %H:%M:%S%.6f"),
        tmsp = record.timestamp_extra(),
        mcnt = record.message_counter(),
        ecu = record.ecu(),
        apid = record.apid(),
        ctid = record.ctid(),
        kind = kind_str(record),
        message = record.message(),
    )
}

/// readable type/subtype/mode column, e.g. "log info V"
fn kind_str(record: &Record) -> String {
    let subtype = record.subtype();
    let named = |names: &[&str]| {
        names
            .get(subtype.max(0) as usize)
            .copied()
            .filter(|n| !n.is_empty())
            .map(String::from)
            .unwrap_or_else(|| format!("{}", subtype))
    };
    let kind = match record.type_code() {
        0 => format!("log {}", named(&LOG_LEVEL_STRS)),
        1 => format!("app_trace {}", named(&TRACE_TYPE_STRS)),
        2 => format!("nw_trace {}", named(&NW_TYPE_STRS)),
        3 => format!("control {}", named(&CONTROL_TYPE_STRS)),
        _ => String::from("--- ---"),
    };
    let mode = match record.mode() {
        pardlt::dlt::Mode::Verbose => "V",
        pardlt::dlt::Mode::NonVerbose => "N",
    };
    format!("{} {}", kind, mode)
}
