//! Trade gate state machine.
//!
//! Every candidate trade passes through here before sizing and routing:
//! cooldown after each executed trade, optional trading-hours policy, a
//! daily trade cap, and an emergency stop that only an explicit resume
//! can clear.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Gate lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Monitoring,
    Cooldown,
    EmergencyStopped,
}

impl std::fmt::Display for GateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateState::Monitoring => write!(f, "monitoring"),
            GateState::Cooldown => write!(f, "cooldown"),
            GateState::EmergencyStopped => write!(f, "emergency_stopped"),
        }
    }
}

/// Allowed trading window by weekday and time of day.
#[derive(Debug, Clone, Deserialize)]
pub struct TradingHours {
    pub enabled: bool,
    /// Allowed weekdays, 0 = Monday .. 6 = Sunday.
    pub days: Vec<u32>,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TradingHours {
    pub fn always() -> Self {
        Self {
            enabled: false,
            days: vec![0, 1, 2, 3, 4],
            start: NaiveTime::from_hms_opt(9, 30, 0).expect("valid time"),
            end: NaiveTime::from_hms_opt(16, 0, 0).expect("valid time"),
        }
    }

    fn allows(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return true;
        }
        let weekday = now.weekday().num_days_from_monday();
        if !self.days.contains(&weekday) {
            return false;
        }
        let t = now.time();
        self.start <= t && t <= self.end
    }
}

#[derive(Debug, Clone)]
pub struct GatePolicy {
    pub cooldown_seconds: u64,
    pub min_confidence: f64,
    pub trading_hours: TradingHours,
    /// 0 = unlimited.
    pub max_daily_trades: u32,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            cooldown_seconds: 300,
            min_confidence: 0.0,
            trading_hours: TradingHours::always(),
            max_daily_trades: 0,
        }
    }
}

/// Per-symbol gate. Created in `Monitoring` at process start and never
/// destroyed; transitions are evaluated lazily on `can_trade`.
#[derive(Debug)]
pub struct TradeGate {
    policy: GatePolicy,
    state: GateState,
    last_trade_at: Option<DateTime<Utc>>,
    trades_today: u32,
    counting_day: Option<NaiveDate>,
}

impl TradeGate {
    pub fn new(policy: GatePolicy) -> Self {
        Self {
            policy,
            state: GateState::Monitoring,
            last_trade_at: None,
            trades_today: 0,
            counting_day: None,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn last_trade_at(&self) -> Option<DateTime<Utc>> {
        self.last_trade_at
    }

    /// Whether a trade with the given confidence may execute now.
    ///
    /// Lazily leaves `Cooldown` once the window has elapsed; never
    /// leaves `EmergencyStopped` on its own.
    pub fn can_trade(&mut self, confidence: f64, now: DateTime<Utc>) -> bool {
        self.roll_daily_counter(now);

        match self.state {
            GateState::EmergencyStopped => return false,
            GateState::Cooldown => {
                let elapsed = self
                    .last_trade_at
                    .map(|t| (now - t).num_seconds())
                    .unwrap_or(i64::MAX);
                if elapsed >= self.policy.cooldown_seconds as i64 {
                    info!(elapsed_secs = elapsed, "cooldown elapsed, back to monitoring");
                    self.state = GateState::Monitoring;
                } else {
                    return false;
                }
            }
            GateState::Monitoring => {}
        }

        if confidence < self.policy.min_confidence {
            return false;
        }
        if !self.policy.trading_hours.allows(now) {
            return false;
        }
        if self.policy.max_daily_trades > 0 && self.trades_today >= self.policy.max_daily_trades {
            warn!(
                trades_today = self.trades_today,
                "daily trade cap reached"
            );
            return false;
        }
        true
    }

    /// Record a successfully executed trade: enter cooldown and stamp
    /// the trade time. Ignored while emergency-stopped (the result of an
    /// in-flight call is discarded, not applied).
    pub fn record_trade(&mut self, now: DateTime<Utc>) {
        if self.state == GateState::EmergencyStopped {
            warn!("trade result discarded: gate is emergency-stopped");
            return;
        }
        self.roll_daily_counter(now);
        self.last_trade_at = Some(now);
        self.trades_today += 1;
        self.state = GateState::Cooldown;
    }

    /// Hard stop from any state. Only `resume` exits.
    pub fn emergency_stop(&mut self) {
        if self.state != GateState::EmergencyStopped {
            warn!(from = %self.state, "emergency stop engaged");
            self.state = GateState::EmergencyStopped;
        }
    }

    /// Explicit operator resume; no-op unless stopped.
    pub fn resume(&mut self) {
        if self.state == GateState::EmergencyStopped {
            info!("emergency stop cleared, monitoring resumed");
            self.state = GateState::Monitoring;
        }
    }

    fn roll_daily_counter(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if self.counting_day != Some(today) {
            self.counting_day = Some(today);
            self.trades_today = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap() // a Monday
    }

    fn gate(cooldown_seconds: u64) -> TradeGate {
        TradeGate::new(GatePolicy {
            cooldown_seconds,
            min_confidence: 0.5,
            trading_hours: TradingHours::always(),
            max_daily_trades: 0,
        })
    }

    #[test]
    fn cooldown_blocks_until_window_elapses() {
        // cooldown=300s: trade at t=0, blocked at t=100, eligible at t=301
        let mut g = gate(300);
        assert!(g.can_trade(1.0, t0()));
        g.record_trade(t0());
        assert_eq!(g.state(), GateState::Cooldown);

        assert!(!g.can_trade(1.0, t0() + Duration::seconds(100)));
        assert!(g.can_trade(1.0, t0() + Duration::seconds(301)));
        assert_eq!(g.state(), GateState::Monitoring);
    }

    #[test]
    fn low_confidence_blocks_in_monitoring() {
        let mut g = gate(60);
        assert!(!g.can_trade(0.1, t0()));
        assert!(g.can_trade(0.5, t0()));
    }

    #[test]
    fn emergency_stop_blocks_until_explicit_resume() {
        let mut g = gate(60);
        g.emergency_stop();
        assert_eq!(g.state(), GateState::EmergencyStopped);

        // Time alone never clears a stop.
        assert!(!g.can_trade(1.0, t0() + Duration::days(7)));

        g.resume();
        assert_eq!(g.state(), GateState::Monitoring);
        assert!(g.can_trade(1.0, t0() + Duration::days(7)));
    }

    #[test]
    fn stop_from_cooldown_stays_stopped_after_window() {
        let mut g = gate(60);
        g.record_trade(t0());
        g.emergency_stop();
        assert!(!g.can_trade(1.0, t0() + Duration::seconds(120)));
    }

    #[test]
    fn trade_result_discarded_when_stopped() {
        let mut g = gate(60);
        g.emergency_stop();
        g.record_trade(t0());
        assert!(g.last_trade_at().is_none());
        assert_eq!(g.state(), GateState::EmergencyStopped);
    }

    #[test]
    fn trading_hours_window_is_enforced() {
        let mut g = TradeGate::new(GatePolicy {
            cooldown_seconds: 0,
            min_confidence: 0.0,
            trading_hours: TradingHours {
                enabled: true,
                days: vec![0, 1, 2, 3, 4],
                start: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
                end: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            },
            max_daily_trades: 0,
        });

        // Monday noon: allowed.
        assert!(g.can_trade(1.0, t0()));
        // Monday 3am: outside hours.
        let early = Utc.with_ymd_and_hms(2024, 6, 3, 3, 0, 0).unwrap();
        assert!(!g.can_trade(1.0, early));
        // Saturday noon: wrong weekday.
        let saturday = Utc.with_ymd_and_hms(2024, 6, 8, 12, 0, 0).unwrap();
        assert!(!g.can_trade(1.0, saturday));
    }

    #[test]
    fn daily_cap_resets_at_midnight() {
        let mut g = TradeGate::new(GatePolicy {
            cooldown_seconds: 0,
            min_confidence: 0.0,
            trading_hours: TradingHours::always(),
            max_daily_trades: 2,
        });

        let mut now = t0();
        for _ in 0..2 {
            assert!(g.can_trade(1.0, now));
            g.record_trade(now);
            now += Duration::seconds(1);
        }
        assert!(!g.can_trade(1.0, now), "cap reached");

        let tomorrow = now + Duration::days(1);
        assert!(g.can_trade(1.0, tomorrow), "counter rolls over");
    }
}
