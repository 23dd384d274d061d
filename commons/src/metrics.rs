//! Metrics service.

use actix_web::HttpResponse;
use prometheus::Registry;

/// For types that store a static Registry reference.
pub trait HasRegistry {
    /// Get the static registry reference.
    fn registry(&self) -> &'static Registry;
}

/// Minimally wraps a Registry for implementing `HasRegistry`.
pub struct RegistryWrapper(pub &'static Registry);

impl HasRegistry for RegistryWrapper {
    fn registry(&self) -> &'static Registry {
        self.0
    }
}

/// Serve metrics requests (Prometheus textual format).
pub async fn serve<T>(app_data: actix_web::web::Data<T>) -> anyhow::Result<HttpResponse>
where
    T: 'static + HasRegistry,
{
    use prometheus::Encoder;

    let metrics = app_data.registry().gather();
    let content = {
        let tenc = prometheus::TextEncoder::new();
        let mut buf = vec![];
        tenc.encode(&metrics, &mut buf).and(Ok(buf))?
    };

    Ok(HttpResponse::Ok().body(content))
}

/// Create a custom Prometheus registry.
pub fn new_registry(prefix: Option<String>) -> anyhow::Result<Registry> {
    Registry::new_custom(prefix.clone(), None).map_err(|e| {
        anyhow::anyhow!(
            "could not create a custom registry with prefix {:?}: {}",
            prefix,
            e
        )
    })
}

/// Render a registry to the Prometheus text exposition format, for one-shot
/// CLI runs that print metrics to stdout instead of serving them over HTTP.
pub fn encode_to_string(registry: &Registry) -> anyhow::Result<String> {
    use prometheus::Encoder;

    let metrics = registry.gather();
    let tenc = prometheus::TextEncoder::new();
    let mut buf = vec![];
    tenc.encode(&metrics, &mut buf)?;
    Ok(String::from_utf8(buf)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn serve_metrics_basic() {
        let _ = testing::init_logger();
        let rt = testing::init_runtime().unwrap();

        let metrics_prefix = "resolver_test";
        let registry = new_registry(Some(metrics_prefix.to_string())).unwrap();
        testing::dummy_gauge(&registry, 42.0).unwrap();
        let registry_wrapped = RegistryWrapper(Box::leak(Box::new(registry)));

        let metrics_call = serve::<RegistryWrapper>(actix_web::web::Data::new(registry_wrapped));
        let resp = rt.block_on(metrics_call).unwrap();

        assert_eq!(resp.status(), 200);
    }

    #[test]
    fn encode_empty_registry() {
        let registry = new_registry(Some("resolver_test_empty".to_string())).unwrap();
        let rendered = encode_to_string(&registry).unwrap();
        assert!(rendered.is_empty());
    }
}
