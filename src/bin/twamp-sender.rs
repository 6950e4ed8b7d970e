use std::{io, net::SocketAddrV4, process};

use twamp_light::{
    configuration::{Configuration, Parser},
    report::Reporter,
    sender::{run_sender, SenderError},
    transport::{resolve_ipv4, UdpTransport},
};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    let conf = Configuration::parse();
    if let Err(e) = conf.validate() {
        eprintln!("Invalid configuration: {}", e);
        process::exit(1);
    }

    if let Err(e) = run(&conf).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(conf: &Configuration) -> Result<(), SenderError> {
    let remote = resolve_ipv4(&conf.remote_host, conf.remote_port).await?;
    let local = SocketAddrV4::new(conf.local_host, conf.local_port);
    let mut transport = UdpTransport::bind(local, conf.tos)?.with_remote(remote);

    log::info!(
        "Configuration valid. Measuring {} from {}",
        remote,
        transport.local_addr()
    );

    let mut reporter = Reporter::new(io::stdout(), conf.output_format);
    run_sender(&mut transport, &conf.session_params(), &mut reporter).await?;
    Ok(())
}
