use {prometheus::Encoder, std::sync::OnceLock};

/// Global metrics registry used by all components.
static REGISTRY: OnceLock<prometheus_metric_storage::StorageRegistry> = OnceLock::new();

/// Configures the global metrics registry with a common prefix for all metric
/// names.
///
/// Must run before anything calls [`get_storage_registry`], ideally first
/// thing in `main`. Fails if the prefix is invalid or the registry was
/// already set up.
pub fn setup_registry(prefix: Option<String>) -> prometheus::Result<()> {
    let registry = prometheus::Registry::new_custom(prefix, None)?;
    let storage_registry = prometheus_metric_storage::StorageRegistry::new(registry);
    REGISTRY
        .set(storage_registry)
        .map_err(|_| prometheus::Error::Msg("metrics registry was already set up".into()))
}

/// Get the global instance of the metrics registry.
pub fn get_registry() -> &'static prometheus::Registry {
    get_storage_registry().registry()
}

/// Get the global instance of the metric storage registry.
///
/// Falls back to an unprefixed registry if [`setup_registry`] never ran so
/// unit tests don't need any setup.
pub fn get_storage_registry() -> &'static prometheus_metric_storage::StorageRegistry {
    REGISTRY.get_or_init(prometheus_metric_storage::StorageRegistry::default)
}

/// Renders all metrics of the registry in the prometheus text format.
pub fn encode(registry: &prometheus::Registry) -> prometheus::Result<String> {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
