use clap::{Arg, ArgAction, ArgMatches, Command};
use std::process;

use deimos::config::EngineConfig;
use deimos::dispatch::Dispatcher;
use deimos::transport::{self, client, Endpoint, ServeOptions};

fn main() {
    env_logger::init();

    let matches = Command::new("deimos")
        .about("Analysis & messaging engine for security assessment orchestration")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("serve")
                .about("Start the engine server")
                .arg(
                    Arg::new("socket")
                        .long("socket")
                        .short('s')
                        .help("Bind endpoint: UNIX socket path or tcp://host:port"),
                )
                .arg(
                    Arg::new("data-dir")
                        .long("data-dir")
                        .short('d')
                        .help("Data directory for results and model snapshots"),
                )
                .arg(
                    Arg::new("alias-file")
                        .long("alias-file")
                        .help("JSON whitelist of approved aliases"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .short('c')
                        .help("TOML configuration file"),
                )
                .arg(
                    Arg::new("once")
                        .long("once")
                        .action(ArgAction::SetTrue)
                        .help("Serve exactly one request and exit"),
                ),
        )
        .subcommand(
            Command::new("send")
                .about("Send one JSON payload and print the response")
                .arg(
                    Arg::new("socket")
                        .long("socket")
                        .short('s')
                        .help("Endpoint to connect to (default: DEIMOS_DB_SOCKET)"),
                )
                .arg(Arg::new("payload").required(true).help("Request JSON")),
        )
        .get_matches();

    let outcome = match matches.subcommand() {
        Some(("serve", sub)) => run_serve(sub),
        Some(("send", sub)) => run_send(sub),
        _ => unreachable!("subcommand required"),
    };

    if let Err(e) = outcome {
        eprintln!("[!] {}", e);
        process::exit(1);
    }
}

fn run_serve(sub: &ArgMatches) -> anyhow::Result<()> {
    let mut config = match sub.get_one::<String>("config") {
        Some(path) => EngineConfig::from_toml_file(path)?,
        None => EngineConfig::load_default_config(),
    }
    .apply_env();

    if let Some(socket) = sub.get_one::<String>("socket") {
        config.bind = socket.clone();
    }
    if let Some(dir) = sub.get_one::<String>("data-dir") {
        config.data_dir = dir.into();
    }
    if let Some(path) = sub.get_one::<String>("alias-file") {
        config.alias_file = Some(path.into());
    }
    config.validate()?;

    let endpoint = Endpoint::parse(&config.bind);
    let options = ServeOptions {
        once: sub.get_flag("once"),
        secret: config.secret.clone(),
        max_request_bytes: config.max_request_bytes,
    };

    let mut dispatcher = Dispatcher::new(&config);
    transport::serve(&endpoint, &options, |request| dispatcher.handle(request))?;
    Ok(())
}

fn run_send(sub: &ArgMatches) -> anyhow::Result<()> {
    let socket = sub
        .get_one::<String>("socket")
        .cloned()
        .or_else(|| std::env::var("DEIMOS_DB_SOCKET").ok())
        .unwrap_or_else(|| "/tmp/deimos.sock".to_string());

    let payload: serde_json::Value = serde_json::from_str(
        sub.get_one::<String>("payload").expect("payload is required"),
    )?;

    let response = client::send_request(&Endpoint::parse(&socket), payload)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
