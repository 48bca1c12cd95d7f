mod cli;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use xrelay_core::carrier::https::HttpsClientCarrier;
use xrelay_core::carrier::udp::UdpCarrier;
use xrelay_core::carrier::PeerAddr;
use xrelay_core::{AppProtocol, Config, SessionEvent, Transport};

use cli::Cli;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = Config::new()
        .with_timeout(cli.timeout())
        .with_max_retries(cli.max_retries)
        .with_https_poll_interval(cli.poll_interval())
        .with_mode(cli.mode);

    let result = match cli.carrier.as_str() {
        "udp" => run_udp(&cli, config).await,
        "https" => run_https(&cli, config).await,
        _ => unreachable!("clap restricts --carrier to udp|https"),
    };

    if let Err(err) = result {
        log::error!("client exiting with error: {err}");
        std::process::exit(1);
    }
}

async fn run_udp(cli: &Cli, config: Config) -> xrelay_core::Result<()> {
    let carrier = UdpCarrier::bind(cli.bind.parse().expect("--bind must be a socket address")).await?;
    let peer_addr: std::net::SocketAddr = cli.peer.parse().expect("--peer must be a socket address for --carrier udp");
    log::info!("connecting to {peer_addr} over UDP");
    let transport = Transport::connect(carrier, PeerAddr::Udp(peer_addr), config).await?;
    run_session(transport, cli).await
}

async fn run_https(cli: &Cli, config: Config) -> xrelay_core::Result<()> {
    let carrier = HttpsClientCarrier::new(cli.peer.clone(), cli.id.clone(), cli.poll_interval());
    log::info!("connecting to {} over HTTPS/OBFS", cli.peer);
    let transport = Transport::connect(carrier, PeerAddr::Https(cli.id.clone()), config).await?;
    run_session(transport, cli).await
}

async fn run_session<C: xrelay_core::carrier::Carrier>(transport: Transport<C>, cli: &Cli) -> xrelay_core::Result<()> {
    let mut session = AppProtocol::connect_client(transport, cli.id.clone(), "1", cli.mode).await?;
    log::info!("session READY with peer {:?} in mode {}", session.peer_id(), cli.mode.as_str());

    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            line = line_rx.recv() => {
                match line {
                    Some(line) if line == "/bye" => {
                        session.close().await?;
                        return Ok(());
                    }
                    Some(line) => {
                        session.send_text(line, &cli.id).await?;
                    }
                    None => {
                        session.close().await?;
                        return Ok(());
                    }
                }
            }
            event = session.recv_event() => {
                match event {
                    Ok(SessionEvent::Message { text, sender }) => println!("{sender}: {text}"),
                    Ok(SessionEvent::Ack { .. }) => {}
                    Ok(SessionEvent::PeerClosed) => {
                        log::info!("peer closed the session");
                        return Ok(());
                    }
                    Ok(SessionEvent::PeerError { code, detail }) => {
                        log::error!("peer reported error {code}: {detail}");
                        return Ok(());
                    }
                    Err(xrelay_core::Error::Timeout) => {}
                    Err(err) => return Err(err),
                }
            }
        }
    }
}

