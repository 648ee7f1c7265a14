use super::{PatternContext, StepResult};
use crate::timeline::EntrySetpoint;

/// Write an event's entry setpoints once
pub async fn apply_entry_setpoints(ctx: &PatternContext, setpoints: &[EntrySetpoint]) -> StepResult {
    for setpoint in setpoints {
        ctx.write(setpoint.address, setpoint.update).await?;
    }
    Ok(())
}
