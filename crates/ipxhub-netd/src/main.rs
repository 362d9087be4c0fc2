use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use ipxhub_netd::network::filter::FilterNetwork;
use ipxhub_netd::network::hub::Hub;
use ipxhub_netd::network::stats::StatsNetwork;
use ipxhub_netd::network::Network;
use ipxhub_netd::server::{Config, Server};

/// DOSBox IPX-over-UDP hub server
#[derive(Parser, Debug)]
#[command(name = "ipxhub-netd")]
#[command(about = "Virtual IPX segment over UDP for DOS-era clients", long_about = None)]
struct Args {
    /// UDP bind address
    #[arg(short, long, default_value = "0.0.0.0:10000")]
    bind: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: Level,

    /// Seconds of client silence before the client is dropped
    #[arg(long, default_value_t = 600)]
    client_timeout: u64,

    /// Seconds between keepalive pings to an otherwise idle client
    #[arg(long, default_value_t = 5)]
    keepalive: u64,

    /// Let NetBIOS traffic (IPX socket 0x455) cross the segment
    #[arg(long)]
    allow_netbios: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    // Segment assembly: statistics outermost so eviction logging sees
    // totals, NetBIOS filter inside it unless disabled.
    let mut network: Arc<dyn Network> = Arc::new(Hub::new());
    if !args.allow_netbios {
        network = Arc::new(FilterNetwork::new(network));
    }
    let network: Arc<dyn Network> = Arc::new(StatsNetwork::new(network));

    let config = Config {
        client_timeout: Duration::from_secs(args.client_timeout),
        keepalive_time: Duration::from_secs(args.keepalive),
    };

    let server = Server::bind(args.bind, network, config).await?;
    info!("IPX hub started on {}", args.bind);
    info!("Log level: {}", args.log_level);

    server.run().await
}
