use std::time::Duration;

use tokio::time::Instant;

use super::{PatternContext, StepResult};
use crate::gateway::{ChannelUpdate, Rgb};

const FLASH_PERIOD: Duration = Duration::from_millis(250);

/// Siren: primary device alternates red and white every 250 ms
pub(super) async fn alternating_flash(ctx: &PatternContext, duration: Duration) -> StepResult {
    let primary = ctx.roles().primary;
    let deadline = Instant::now() + duration;

    let phases = [(Rgb::RED, "Red"), (Rgb::WHITE, "White")];
    'outer: loop {
        for (colour, phase) in phases {
            ctx.check()?;
            if Instant::now() >= deadline {
                break 'outer;
            }
            ctx.write(primary, ChannelUpdate::led(colour)).await?;
            ctx.tick("AmbulanceSiren", phase);
            ctx.sleep_within(FLASH_PERIOD, deadline).await?;
        }
    }
    Ok(())
}
