use async_trait::async_trait;
use civic_startup::TelemetryWarmup;
use tokio::net::TcpStream;

/// Connects once to the telemetry collector.
#[derive(Debug, Clone)]
pub struct CollectorWarmup {
    address: String,
}

impl CollectorWarmup {
    /// Accepts `host:port` or a URL such as `http://host:port/v1/traces`.
    pub fn new(endpoint: &str) -> Result<Self, String> {
        let address = collector_address(endpoint)?;
        Ok(Self { address })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl TelemetryWarmup for CollectorWarmup {
    async fn warm_up(&self) -> Result<(), String> {
        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|e| format!("collector {} unreachable: {e}", self.address))?;
        tracing::debug!(peer = ?stream.peer_addr().ok(), "telemetry collector reachable");
        Ok(())
    }
}

fn collector_address(endpoint: &str) -> Result<String, String> {
    let trimmed = endpoint.trim();
    let (scheme, rest) = match trimmed.split_once("://") {
        Some((scheme, rest)) => (Some(scheme.to_ascii_lowercase()), rest),
        None => (None, trimmed),
    };
    let authority = rest.split('/').next().unwrap_or_default();
    if authority.is_empty() {
        return Err(format!("telemetry endpoint '{endpoint}' has no host"));
    }
    if authority.rsplit_once(':').is_some_and(|(_, port)| port.parse::<u16>().is_ok()) {
        return Ok(authority.to_string());
    }
    match scheme.as_deref() {
        Some("https") => Ok(format!("{authority}:443")),
        Some("http") | None => Ok(format!("{authority}:80")),
        Some(other) => Err(format!("unsupported telemetry scheme '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_forms() {
        assert_eq!(collector_address("collector:4317").unwrap(), "collector:4317");
        assert_eq!(
            collector_address("http://otel.city.gov:4318/v1/traces").unwrap(),
            "otel.city.gov:4318"
        );
        assert_eq!(collector_address("https://otel.city.gov").unwrap(), "otel.city.gov:443");
        assert_eq!(collector_address(" otel:9 ").unwrap(), "otel:9");
        assert!(collector_address("ftp://otel").is_err());
        assert!(collector_address("http:///path").is_err());
    }

    #[tokio::test]
    async fn reachable_collector_warms_up() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        CollectorWarmup::new(&address).unwrap().warm_up().await.unwrap();
    }

    #[tokio::test]
    async fn closed_port_is_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = CollectorWarmup::new(&address).unwrap().warm_up().await.unwrap_err();
        assert!(err.contains("unreachable"), "{err}");
    }
}
