use thiserror::Error;

/// Errors raised while talking to the message broker.
#[derive(Error, Debug)]
pub enum KafkaAccessError {
    #[error("Kafka client error: {0}")]
    Client(String),

    #[error("Kafka subscribe error: {0}")]
    Subscribe(String),

    #[error("Kafka poll error: {0}")]
    Poll(String),

    #[error("Kafka transaction error: {0}")]
    Transaction(String),

    #[error("Kafka produce error: {0}")]
    Produce(String),

    #[error("Kafka offset commit error: {0}")]
    Commit(String),
}

impl KafkaAccessError {
    pub fn client(msg: impl Into<String>) -> Self {
        Self::Client(msg.into())
    }

    pub fn subscribe(msg: impl Into<String>) -> Self {
        Self::Subscribe(msg.into())
    }

    pub fn poll(msg: impl Into<String>) -> Self {
        Self::Poll(msg.into())
    }

    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::Transaction(msg.into())
    }

    pub fn produce(msg: impl Into<String>) -> Self {
        Self::Produce(msg.into())
    }

    pub fn commit(msg: impl Into<String>) -> Self {
        Self::Commit(msg.into())
    }
}
