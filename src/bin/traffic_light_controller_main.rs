use junction_control::control_system::admin_cli::run_cli;
use junction_control::control_system::cycle_driver::run_cycle_driver;
use junction_control::flow_analyzer::vision::{SimulatedAnalyzer, VisionAnalyzer};
use junction_control::monitoring::count_sink::CsvCountSink;
use junction_control::monitoring::signal_broadcast::AmqpBroadcaster;
use junction_control::{ControllerConfig, TrafficLightController};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = ControllerConfig::from_env();
    println!("Starting traffic light controller...");
    println!("Recording vehicle counts to {}", config.count_log_path.display());

    let sink = Arc::new(CsvCountSink::new(config.count_log_path.clone()));
    let mut controller = TrafficLightController::new(sink);
    if config.broadcast {
        println!("Broadcasting signal updates to {}", config.amqp_url);
        controller = controller.with_broadcaster(Arc::new(AmqpBroadcaster::new(
            config.amqp_url.clone(),
        )));
    }
    let controller = Arc::new(controller);

    // Cameras are not attached; counts for `observe` are simulated.
    let analyzer: Arc<dyn VisionAnalyzer> = Arc::new(SimulatedAnalyzer::new(
        junction_control::shared_data::current_timestamp(),
        40,
    ));

    let driver = tokio::spawn(run_cycle_driver(controller.clone(), config.cycle_period));
    run_cli(controller, analyzer).await;
    driver.abort();
}
