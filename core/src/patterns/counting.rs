use std::time::Duration;

use super::{Cancelled, PatternContext, StepResult};
use crate::gateway::{Channel, ChannelUpdate, Rgb, Vibration};

const STRONG_TICK: Vibration = Vibration::on(41.2, 1.0);
const COUNT_HOLD: Duration = Duration::from_secs(1);
const TERMINAL_HOLD: Duration = Duration::from_secs(2);

/// One count: primary flashes red with a strong vibration tick.
///
/// The terminal count also takes the secondary device's LED and vibration
/// channels for the whole hold, forcing it red and still. Both devices are
/// restored afterwards even if the routine was cancelled.
pub(super) async fn counting_flash(ctx: &PatternContext, terminal: bool) -> StepResult {
    let roles = ctx.roles();
    let hold = if terminal { TERMINAL_HOLD } else { COUNT_HOLD };

    let secondary_guards = if terminal {
        let locks = &ctx.env().locks;
        let acquire = async {
            let led = locks.hold(roles.secondary, Channel::Led).await;
            let vibration = locks.hold(roles.secondary, Channel::Vibration).await;
            (led, vibration)
        };
        tokio::select! {
            guards = acquire => Some(guards),
            _ = ctx.cancel_token().cancelled() => return Err(Cancelled),
        }
    } else {
        None
    };

    let outcome = async {
        ctx.write(
            roles.primary,
            ChannelUpdate::led(Rgb::RED).with_vibration(STRONG_TICK),
        )
        .await?;
        if terminal {
            ctx.write(
                roles.secondary,
                ChannelUpdate::led(Rgb::RED).with_vibration(STRONG_TICK.halted()),
            )
            .await?;
        }
        ctx.sleep(hold).await
    }
    .await;

    ctx.restore(
        roles.primary,
        ChannelUpdate::led(Rgb::OFF).with_vibration(STRONG_TICK.halted()),
    )
    .await;
    if terminal {
        ctx.restore(roles.secondary, ChannelUpdate::led(Rgb::OFF))
            .await;
    }
    drop(secondary_guards);

    outcome
}
