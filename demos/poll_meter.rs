// Poll a UM series meter and print every decoded frame
//
// Connects to the given port (or scans all serial ports), polls until the
// sample or time limit is hit, then prints a summary and optionally writes
// the recording as CSV.

use clap::Parser;
use polars::prelude::*;
use rdtech_um_rs::{
    AcquisitionConfig, AnalogSample, DataFrameRecorder, MeterConnector, SampleSink,
};
use std::fs::File;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(about = "Poll an RDTech UM series USB power meter")]
struct Args {
    /// Serial port of the meter. Scans all ports when omitted.
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate of the serial link
    #[arg(short, long, default_value_t = 9600)]
    baud: u32,

    /// Stop after this many frames
    #[arg(short, long, default_value_t = 20)]
    samples: u64,

    /// Stop after this many milliseconds
    #[arg(short, long)]
    time_ms: Option<u64>,

    /// Write the recording to this CSV file
    #[arg(long)]
    csv: Option<String>,
}

/// Prints each frame on one line and keeps a recording.
struct PrintingRecorder {
    recorder: DataFrameRecorder,
    line: String,
}

impl SampleSink for PrintingRecorder {
    fn send(&mut self, sample: &AnalogSample) {
        self.line.push_str(&format!(
            "{}={:.*}{} ",
            sample.channel.name,
            sample.digits() as usize,
            sample.value,
            sample.unit().symbol()
        ));
        self.recorder.send(sample);
    }

    fn frame_done(&mut self) {
        println!("{}", self.line.trim_end());
        self.line.clear();
        self.recorder.frame_done();
    }

    fn end_acquisition(&mut self) {
        self.recorder.end_acquisition();
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut config = AcquisitionConfig::new()
        .baud_rate(args.baud)
        .limit_samples(args.samples);
    if let Some(port) = &args.port {
        config = config.port(port);
    }
    if let Some(ms) = args.time_ms {
        config = config.limit_time(Duration::from_millis(ms));
    }

    println!("Available ports: {:?}", MeterConnector::available_ports()?);

    let meter = MeterConnector::connect(&config)?;
    println!("Connected to {}\n", meter.profile());

    let sink = PrintingRecorder {
        recorder: DataFrameRecorder::new(meter.profile()),
        line: String::new(),
    };
    let mut session = meter.start(sink, config.limits());
    session.run(config.get_tick_interval(), || false);

    let stats = session.stats();
    println!(
        "\n{} frames decoded, {} rejected, {} resync bytes, {} polls sent",
        stats.frames_decoded, stats.frames_rejected, stats.resyncs, stats.polls_sent
    );

    let (_, sink, _) = session.into_parts();
    let mut df = sink.recorder.to_dataframe()?;
    println!("{}", df);

    if let Some(path) = args.csv {
        let mut file = File::create(&path)?;
        CsvWriter::new(&mut file).finish(&mut df)?;
        println!("Wrote {}", path);
    }

    Ok(())
}
