use tracing_subscriber::EnvFilter;

fn main() {
    if handle_cli_flags() {
        return;
    }

    init_tracing();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    if let Err(err) = feedbridge::run(args) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

/// Flags are only recognised in first position, so later words such as an
/// ignored name reach the command parser untouched.
fn handle_cli_flags() -> bool {
    let Some(arg) = std::env::args().nth(1) else {
        return false;
    };
    match arg.as_str() {
        "--version" | "-V" => {
            println!("feedbridge {}", feedbridge::VERSION);
            true
        }
        "--help" | "-h" => {
            println!(
                "feedbridge: relay a social news stream as chat lines.\n\n  add <nick> <user_id> <api_key> <session_key> <session_secret>\n  delete <nick>\n  list\n  url <nick>\n  update\n  ignore add|delete|list app|friend <nick> [name...]\n  poll                 Poll on an interval, reading commands from stdin\n\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message"
            );
            true
        }
        _ => false,
    }
}

fn init_tracing() {
    let level = feedbridge::config::load(feedbridge::config::LoadOptions::default())
        .map(|cfg| cfg.log.level)
        .unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
