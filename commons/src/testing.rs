//! Test helpers.

use tokio::runtime::Runtime;

/// Initialize logging.
pub fn init_logger() -> anyhow::Result<()> {
    env_logger::try_init_from_env(env_logger::Env::default())?;
    Ok(())
}

/// Initialize a tokio runtime for tests, with logging.
pub fn init_runtime() -> anyhow::Result<Runtime> {
    let _ = init_logger();
    Ok(Runtime::new()?)
}

/// Register a dummy gauge, with given value.
pub fn dummy_gauge(registry: &prometheus::Registry, value: f64) -> anyhow::Result<()> {
    let test_gauge = prometheus::Gauge::new("dummy_gauge", "dummy help")?;
    test_gauge.set(value);
    registry.register(Box::new(test_gauge))?;
    Ok(())
}
