use junction_control::monitoring::signal_monitor::listen_signal_updates;
use junction_control::ControllerConfig;

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = ControllerConfig::from_env();
    println!(
        "Logging signal updates from {} to {}",
        config.amqp_url,
        config.signal_log_path.display()
    );
    if let Err(e) = listen_signal_updates(config.amqp_url, config.signal_log_path).await {
        eprintln!("Error in signal updates listener: {}", e);
    }
}
