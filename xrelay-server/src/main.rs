mod cli;

use clap::Parser;

use xrelay_core::carrier::https::HttpsServerCarrier;
use xrelay_core::carrier::udp::UdpCarrier;
use xrelay_core::{AppProtocol, Config, SessionEvent, Transport};

use cli::Cli;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = Config::new()
        .with_timeout(cli.timeout())
        .with_max_retries(cli.max_retries)
        .with_https_queue_limit(cli.queue_limit)
        .with_mode(cli.mode);

    let result = match cli.carrier.as_str() {
        "udp" => run_udp(&cli, config).await,
        "https" => run_https(&cli, config).await,
        _ => unreachable!("clap restricts --carrier to udp|https"),
    };

    if let Err(err) = result {
        log::error!("server exiting with error: {err}");
        std::process::exit(1);
    }
}

async fn run_udp(cli: &Cli, config: Config) -> xrelay_core::Result<()> {
    let carrier = UdpCarrier::bind(cli.bind.parse().expect("--bind must be a socket address")).await?;
    log::info!("listening on {} over UDP, waiting for SYN", cli.bind);
    let transport = Transport::accept(carrier, config).await?;
    run_session(transport, cli).await
}

async fn run_https(cli: &Cli, config: Config) -> xrelay_core::Result<()> {
    let (carrier, router) = HttpsServerCarrier::new(cli.queue_limit);
    let listener = tokio::net::TcpListener::bind(&cli.bind)
        .await
        .unwrap_or_else(|err| panic!("failed to bind {}: {err}", cli.bind));
    log::info!("listening on {} over HTTPS/OBFS, waiting for SYN", cli.bind);

    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router).await {
            log::error!("HTTP listener stopped: {err}");
        }
    });

    let transport = Transport::accept(carrier, config).await?;
    run_session(transport, cli).await
}

async fn run_session<C: xrelay_core::carrier::Carrier>(transport: Transport<C>, cli: &Cli) -> xrelay_core::Result<()> {
    let mut session = AppProtocol::accept_server(transport, cli.id.clone(), "1", cli.mode).await?;
    log::info!("session READY with peer {:?} in mode {}", session.peer_id(), cli.mode.as_str());

    loop {
        match session.recv_event().await {
            Ok(SessionEvent::Message { text, sender }) => {
                log::info!("{sender}: {text}");
                session.send_text(format!("echo: {text}"), &cli.id).await?;
            }
            Ok(SessionEvent::Ack { .. }) => {}
            Ok(SessionEvent::PeerClosed) => {
                log::info!("client closed the session");
                return Ok(());
            }
            Ok(SessionEvent::PeerError { code, detail }) => {
                log::error!("client reported error {code}: {detail}");
                return Ok(());
            }
            Err(xrelay_core::Error::Timeout) => {}
            Err(err) => return Err(err),
        }
    }
}
