//! Passive-income accrual engine.
//!
//! Pure transformations on a [`UserRecord`]; the caller supplies `now` as
//! unix seconds and the offline cap from config, so the engine touches no
//! clock and no store. Every settle cycle in the db layer funnels through
//! these functions.

use crate::db::users::UserRecord;

/// Advances `last_accrual_ts` to `now` and credits the reward earned since
/// the previous accrual: one point per second per robot level, with elapsed
/// time clamped to `max_offline_secs`.
///
/// The timestamp advances even when no reward is granted (level 0, zero
/// elapsed, or clock skew), which makes repeated calls over a split interval
/// credit exactly as much as a single call over the whole interval.
pub fn accrue(record: &mut UserRecord, now: i64, max_offline_secs: i64) {
    let elapsed = (now - record.last_accrual_ts).clamp(0, max_offline_secs);

    if record.robot_level > 0 {
        record.balance += elapsed as f64 * record.robot_level as f64;
    }

    // Unconditional, also on clock skew. Never grants negative reward.
    record.last_accrual_ts = now;
}

/// Merges a client-reported balance with the server-accrued one by taking
/// the maximum. Applied strictly after [`accrue`]. The client runs an
/// optimistic local ticker that can briefly outpace the server between
/// polls; the max rule keeps the UI from ever seeing its balance regress.
pub fn reconcile(record: &mut UserRecord, client_balance: f64) {
    record.balance = record.balance.max(client_balance);
}

/// Switches the robot level, settling all reward at the old level first so
/// a new level never applies to already-elapsed time.
pub fn activate(record: &mut UserRecord, new_level: i64, now: i64, max_offline_secs: i64) {
    accrue(record, now, max_offline_secs);
    record.robot_level = new_level;
    record.last_accrual_ts = now;
}
