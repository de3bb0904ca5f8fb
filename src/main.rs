#[cfg(unix)]
fn main() {
    use log::error;
    use microserv::config::parse_config_file;
    use microserv::network::server::Server;

    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .expect("failed to init logger");

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        eprintln!("usage: microserv <config-file>");
        std::process::exit(1);
    }

    let configs = match parse_config_file(&args[1]) {
        Ok(c) => c,
        Err(e) => {
            error!("config error: {}", e);
            std::process::exit(1);
        }
    };

    let server = Server::new(configs);
    if let Err(e) = server.run() {
        error!("server error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(unix))]
fn main() {
    eprintln!("This server only works on Unix/Linux systems!");
}
