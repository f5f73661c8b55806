// ====== Unified Error Types ======

/// Per-call failure of the block explorer. `RateLimited` and `Unavailable`
/// are retried inside the client; the rest surface immediately.
#[derive(Debug, thiserror::Error)]
pub enum ExplorerError {
  #[error("rate limited by upstream")]
  RateLimited,

  #[error("upstream unavailable: {0}")]
  Unavailable(String),

  #[error("not found")]
  NotFound,

  #[error("malformed response: {0}")]
  Malformed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
  #[error("Upstream unavailable: {0}")]
  UpstreamUnavailable(String),

  #[error("Store unavailable: {0}")]
  StoreUnavailable(String),

  #[error("Too many concurrent investigations")]
  Busy,

  #[error("Investigation deadline exceeded")]
  DeadlineExceeded,

  #[error("Monitor error: {0}")]
  Monitor(String),

  #[error("Configuration error: {0}")]
  Config(String),

  #[error("Task join error: {0}")]
  JoinError(#[from] tokio::task::JoinError),

  #[error("Initialization error: {0}")]
  Initialization(String),
}

// ====== Error Conversions (From impls) ======

impl From<ExplorerError> for AppError {
  fn from(err: ExplorerError) -> Self {
    AppError::UpstreamUnavailable(err.to_string())
  }
}

impl From<reqwest::Error> for ExplorerError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      ExplorerError::Malformed(format!("Reqwest decode error: {}", err))
    } else {
      ExplorerError::Unavailable(format!("Reqwest error: {}", err))
    }
  }
}

impl From<serde_json::Error> for ExplorerError {
  fn from(err: serde_json::Error) -> Self {
    ExplorerError::Malformed(format!("JSON parse error: {}", err))
  }
}

impl From<neo4rs::Error> for AppError {
  fn from(err: neo4rs::Error) -> Self {
    AppError::StoreUnavailable(format!("Neo4j error: {}", err))
  }
}

impl From<std::io::Error> for AppError {
  fn from(err: std::io::Error) -> Self {
    AppError::Initialization(format!("IO error: {}", err))
  }
}
