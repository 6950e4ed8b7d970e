use std::{net::SocketAddrV4, process};

use twamp_light::{
    configuration::{Parser, ReflectorConfiguration},
    reflector::run_reflector,
    transport::UdpTransport,
};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    let conf = ReflectorConfiguration::parse();
    let local = SocketAddrV4::new(conf.local_host, conf.local_port);

    let mut transport = match UdpTransport::bind(local, conf.tos) {
        Ok(transport) => transport,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    if let Err(e) = run_reflector(&mut transport, shutdown).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
