use thiserror::Error;

#[derive(Error, Debug)]
pub enum PhishVaultError {
    #[error("Graph store error: {0}")]
    Graph(String),

    #[error("Policy error: {0}")]
    Policy(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
