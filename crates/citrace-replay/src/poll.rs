//! Bounded completion polling.

/// Poll `ready` until it reports true, invoking `wait` between attempts, for
/// at most `max_attempts` attempts.
///
/// Returns `Ok(true)` as soon as readiness is observed and `Ok(false)` when
/// the attempt budget runs out first. The bound makes this a best-effort
/// wait, not a synchronization guarantee: callers are expected to proceed
/// either way.
pub fn poll_until<C, E>(
    max_attempts: u32,
    ctx: &mut C,
    mut ready: impl FnMut(&mut C) -> Result<bool, E>,
    mut wait: impl FnMut(&mut C),
) -> Result<bool, E> {
    for attempt in 0..max_attempts {
        if ready(ctx)? {
            return Ok(true);
        }
        if attempt + 1 != max_attempts {
            wait(ctx);
        }
    }
    Ok(false)
}
