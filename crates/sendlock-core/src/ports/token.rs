//! TokenProvider port - OAuth bearer token

use async_trait::async_trait;

use crate::domain::PipelineError;

#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn bearer_token(&self) -> Result<String, PipelineError>;
}
