use async_pinger::{Network, Pinger, PingerConfigBuilder, ProbeError, ReplyHandler};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

/// Simple example to show periodic ICMP probing
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Endpoints to ping, hostnames or IP addresses
    #[arg(required = true)]
    endpoints: Vec<String>,
    /// Network family, "ip4:icmp" or "ip6:ipv6-icmp"
    #[arg(short, long, default_value = "ip4:icmp")]
    network: Network,
    /// Local address to bind to
    #[arg(short, long, default_value = "")]
    bind: String,
    /// Reply timeout in milliseconds
    #[arg(short, long, default_value_t = 1000)]
    timeout: u64,
    /// Interval between rounds in milliseconds
    #[arg(short, long, default_value_t = 1000)]
    interval: u64,
    /// Stop after this many rounds
    #[arg(short, long)]
    count: Option<usize>,
}

struct Stdout;

impl ReplyHandler for Stdout {
    fn on_succeed(&self, endpoint: &str, elapsed: Duration, identifier: u16) {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{endpoint}: id={identifier} time={elapsed:?}").unwrap();
    }

    fn on_timeout(&self, endpoint: &str, identifier: u16) {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{endpoint}: id={identifier} timeout").unwrap();
    }

    fn on_failed(&self, endpoint: &str, cause: &ProbeError) {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{endpoint}: failed, {cause}").unwrap();
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = PingerConfigBuilder::new()
        .with_network(args.network)
        .with_bind_address(&args.bind)
        .with_endpoints(args.endpoints)
        .with_timeout(Duration::from_millis(args.timeout))
        .with_interval(Duration::from_millis(args.interval))
        .build()
        .unwrap();
    let handlers = vec![Arc::new(Stdout) as Arc<dyn ReplyHandler>];
    let pinger = Pinger::new(config.clone(), handlers).unwrap();

    match args.count {
        Some(count) => {
            for round in 0..count {
                if round > 0 {
                    tokio::time::sleep(config.interval).await;
                }
                pinger.ping_once(config.timeout).await;
            }
        }
        None => pinger.run().await,
    }
    pinger.close();
}
