use std::time::Duration;

use tokio::time::Instant;

use super::{PatternContext, StepResult};
use crate::gateway::{ChannelUpdate, Rgb, Vibration};

const BEAT_INTERVAL: Duration = Duration::from_millis(500);
const FADE_START: u8 = 241;
const FADE_STEP: u8 = 20;
const FADE_FLOOR: u8 = 20;
const BEAT: Vibration = Vibration::on(41.2, 1.0);

/// Red levels of one beat's fade: 241, 221, ... 41, 21
fn fade_levels() -> impl Iterator<Item = u8> {
    std::iter::successors(Some(FADE_START), |level| level.checked_sub(FADE_STEP))
        .take_while(|level| *level > FADE_FLOOR)
}

/// Heartbeat on the secondary device.
///
/// Each beat fades red from high to low (vibration held off on the first
/// step), then sets the vibration go flag. Writes are skipped while another
/// routine holds the target channel.
pub(super) async fn rhythmic_pulse(ctx: &PatternContext, duration: Duration) -> StepResult {
    let secondary = ctx.roles().secondary;
    let deadline = Instant::now() + duration;

    while Instant::now() < deadline {
        ctx.check()?;
        ctx.tick("HeartBeat", "Pulse");

        for (step, level) in fade_levels().enumerate() {
            let mut update = ChannelUpdate::led(Rgb::red(level));
            if step == 0 {
                update = update.with_vibration(BEAT.halted());
            }
            ctx.write_unless_locked(secondary, update).await?;
        }
        ctx.write_unless_locked(secondary, ChannelUpdate::vibration(BEAT))
            .await?;

        ctx.sleep_within(BEAT_INTERVAL, deadline).await?;
    }
    Ok(())
}
