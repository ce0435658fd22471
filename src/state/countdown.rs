//! Shared countdown rendering.
//!
//! The host writes a single `{startAt, duration}` anchor; every client
//! derives the remaining seconds locally from it on a fast refresh, so all
//! viewers converge on the same displayed number without the host pushing
//! a tick over the network.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::warn;

use crate::model::{CountdownAnchor, now_millis};
use crate::session::SessionContext;
use crate::store::path;

/// How often the display is recomputed between anchor changes.
pub const REFRESH_PERIOD: Duration = Duration::from_millis(200);

/// Seconds left on `anchor` at `now` (both in unix milliseconds), clamped
/// to zero.
pub fn remaining_seconds(anchor: &CountdownAnchor, now: u64) -> u32 {
    let end = anchor.start_at + u64::from(anchor.duration) * 1000;
    if now >= end {
        return 0;
    }
    (end - now).div_ceil(1000) as u32
}

/// Follow the room's countdown anchor as a displayable number of seconds.
///
/// `None` means "show nothing": no anchor, or an expired one. Removal of the
/// anchor clears the display even if the local clock has not reached expiry.
pub fn watch_countdown(ctx: &SessionContext) -> watch::Receiver<Option<u32>> {
    let ctx = ctx.clone();
    let (sender, receiver) = watch::channel(None);
    tokio::spawn(async move {
        let mut subscription = match ctx.store().subscribe(path::countdown(ctx.room())).await {
            Ok(subscription) => subscription,
            Err(err) => {
                warn!(room = %ctx.room(), error = %err, "countdown watch failed to start");
                return;
            }
        };

        let mut anchor: Option<CountdownAnchor> = None;
        let mut refresh = tokio::time::interval(REFRESH_PERIOD);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                snapshot = subscription.recv() => match snapshot {
                    Some(value) => {
                        anchor = value.and_then(|v| serde_json::from_value(v).ok());
                    }
                    None => break,
                },
                _ = refresh.tick() => {}
            }
            if sender.is_closed() {
                break;
            }
            let display = anchor
                .as_ref()
                .map(|anchor| remaining_seconds(anchor, now_millis()))
                .filter(|seconds| *seconds > 0);
            sender.send_if_modified(|current| {
                if *current == display {
                    return false;
                }
                *current = display;
                true
            });
        }
    });
    receiver
}
