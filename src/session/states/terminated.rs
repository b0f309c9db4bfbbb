use anyhow::Result;
use async_trait::async_trait;

use super::StateHandler;
use crate::session::context::SessionContext;
use crate::session::phase::SessionPhase;

pub struct TerminatedState;

#[async_trait]
impl StateHandler for TerminatedState {
    async fn execute(&self, _ctx: &mut SessionContext) -> Result<SessionPhase> {
        Ok(SessionPhase::Terminated)
    }
}
