use std::env;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use tracing::warn;

const DEFAULT_BROKER: &str = "localhost:9092";
const DEFAULT_TRANSACTION_TIMEOUT_MS: u64 = 60_000;

/// Connection settings shared by consumers and producers.
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Bootstrap servers (e.g., "localhost:9092")
    pub broker: String,
    /// SASL username (enables SASL/SSL if set together with the password)
    pub username: Option<String>,
    pub password: Option<String>,
    /// Custom CA certificate in PEM format
    pub ssl_ca_pem: Option<String>,
    /// Bound on transactional init, commit and abort calls
    pub transaction_timeout: Duration,
}

impl KafkaConfig {
    pub fn new(broker: impl Into<String>) -> Self {
        Self {
            broker: broker.into(),
            username: None,
            password: None,
            ssl_ca_pem: None,
            transaction_timeout: Duration::from_millis(DEFAULT_TRANSACTION_TIMEOUT_MS),
        }
    }

    /// Create a KafkaConfig from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `KAFKA_BROKER` - Broker address (default `localhost:9092`)
    /// - `KAFKA_USERNAME` - SASL username (optional)
    /// - `KAFKA_PASSWORD` - SASL password (optional)
    /// - `KAFKA_SSL_CA_PEM` - Custom CA cert in PEM format (optional)
    /// - `KAFKA_TRANSACTION_TIMEOUT_MS` - Transaction timeout (default 60000)
    pub fn from_env() -> Self {
        let transaction_timeout_ms = match env::var("KAFKA_TRANSACTION_TIMEOUT_MS") {
            Ok(raw) => raw.parse::<u64>().unwrap_or_else(|_| {
                warn!(
                    value = %raw,
                    default = DEFAULT_TRANSACTION_TIMEOUT_MS,
                    "Invalid KAFKA_TRANSACTION_TIMEOUT_MS, using default"
                );
                DEFAULT_TRANSACTION_TIMEOUT_MS
            }),
            Err(_) => DEFAULT_TRANSACTION_TIMEOUT_MS,
        };

        Self {
            broker: env::var("KAFKA_BROKER").unwrap_or_else(|_| DEFAULT_BROKER.to_string()),
            username: env::var("KAFKA_USERNAME").ok(),
            password: env::var("KAFKA_PASSWORD").ok(),
            ssl_ca_pem: env::var("KAFKA_SSL_CA_PEM").ok(),
            transaction_timeout: Duration::from_millis(transaction_timeout_ms),
        }
    }

    pub fn with_credentials(mut self, username: String, password: String) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }

    /// Base client configuration with bootstrap servers and security settings.
    pub(crate) fn client_config(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config.set("bootstrap.servers", &self.broker);

        // Plaintext unless both SASL credentials are present
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            client_config
                .set("security.protocol", "SASL_SSL")
                .set("sasl.mechanisms", "PLAIN")
                .set("sasl.username", username)
                .set("sasl.password", password);

            if let Some(ca_pem) = &self.ssl_ca_pem {
                client_config.set("ssl.ca.pem", ca_pem);
            }
        }

        client_config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plaintext_without_credentials() {
        let config = KafkaConfig::new("broker:9092");
        let client_config = config.client_config();

        assert_eq!(client_config.get("bootstrap.servers"), Some("broker:9092"));
        assert_eq!(client_config.get("security.protocol"), None);
    }

    #[test]
    fn test_sasl_with_credentials() {
        let config = KafkaConfig::new("broker:9092")
            .with_credentials("user".to_string(), "secret".to_string());
        let client_config = config.client_config();

        assert_eq!(client_config.get("security.protocol"), Some("SASL_SSL"));
        assert_eq!(client_config.get("sasl.username"), Some("user"));
        assert_eq!(client_config.get("ssl.ca.pem"), None);
    }
}
