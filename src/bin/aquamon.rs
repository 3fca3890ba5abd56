//! Aquamon command line poller
//!
//! Takes one positional argument, the serial port the probe is wired
//! to, and polls it with the default session configuration: slave
//! address 0x01, pH first, alternating formats every cycle. Prints one
//! line per reading and one line per recovered error; a summary of the
//! session is printed on exit.

use anyhow::{bail, Context, Result};

use aquamon::{ConsoleSink, MeterTransport, PollConfig, Poller, SerialTransport};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let port = match std::env::args().nth(1) {
        Some(port) => port,
        None => bail!("usage: aquamon <serial-port>"),
    };

    log::info!("aquamon {} connecting to {}", aquamon::VERSION, port);

    let transport = SerialTransport::new(&port)
        .with_context(|| format!("failed to open serial port {}", port))?;

    let mut poller = Poller::new(transport, PollConfig::default());
    let mut sink = ConsoleSink;

    let result = poller.run(&mut sink).await;

    let poll_stats = poller.stats();
    let transport_stats = poller.transport().stats();

    // The port is released on every exit path, fatal errors included.
    poller.shutdown().await.ok();

    println!("\n=== Session Statistics ===");
    println!("Iterations: {}", poll_stats.iterations);
    println!("Readings: {}", poll_stats.readings);
    println!("Recovered errors: {}", poll_stats.recovered_errors);
    println!("Success rate: {:.2}%", poll_stats.success_rate());
    println!("Frames sent: {}", transport_stats.frames_sent);
    println!(
        "Bytes sent/received: {}/{}",
        transport_stats.bytes_sent, transport_stats.bytes_received
    );
    println!("Timeouts: {}", transport_stats.timeouts);

    result
        .map(|_| ())
        .with_context(|| format!("poll session against {} failed", port))
}
