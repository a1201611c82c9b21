use async_trait::async_trait;

use crate::error::GatewayError;
use crate::model::{Receipt, SubmittedAnswer};

/// Remote side of an attempt: where in-progress answers and the final
/// submission are persisted. Implementations may fail transiently.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn save_answer(
        &self,
        attempt_id: &str,
        question_id: &str,
        value: &str,
    ) -> Result<(), GatewayError>;

    async fn submit_attempt(
        &self,
        attempt_id: &str,
        answers: &[SubmittedAnswer],
    ) -> Result<Receipt, GatewayError>;
}
