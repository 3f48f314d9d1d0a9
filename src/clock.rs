//! Clock & Calendar. Every higher layer reads time only through this
//! trait so tests can inject a fake clock instead of reaching for
//! `Utc::now()` directly — the same seam the broker and market-data
//! ports give their own implementations.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::Tz;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallClock {
    pub exchange_time: DateTime<Tz>,
    pub local_time: DateTime<Tz>,
}

pub trait Clock: Send + Sync {
    fn now(&self) -> WallClock;

    fn is_market_hours(&self) -> bool {
        let wc = self.now();
        is_market_hours_at(wc.exchange_time)
    }

    fn minutes_to_close(&self) -> i64 {
        let wc = self.now();
        minutes_to_close_at(wc.exchange_time)
    }

    fn next_open(&self) -> DateTime<Tz> {
        next_open_after(self.now().exchange_time)
    }
}

/// True only on weekdays between exchange-local 09:30 and 16:00
/// inclusive of the boundary: `minutesToClose() == 0` still counts as
/// in-market hours, i.e. 16:00 itself is in-market.
pub fn is_market_hours_at(exchange_time: DateTime<Tz>) -> bool {
    if matches!(exchange_time.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }
    let minutes_since_midnight = exchange_time.hour() as i64 * 60 + exchange_time.minute() as i64;
    let open = 9 * 60 + 30;
    let close = 16 * 60;
    minutes_since_midnight >= open && minutes_since_midnight <= close
}

pub fn minutes_to_close_at(exchange_time: DateTime<Tz>) -> i64 {
    let minutes_since_midnight = exchange_time.hour() as i64 * 60 + exchange_time.minute() as i64;
    let close = 16 * 60;
    (close - minutes_since_midnight).max(0)
}

/// Next exchange-local market open, skipping weekends.
pub fn next_open_after(exchange_time: DateTime<Tz>) -> DateTime<Tz> {
    let mut day = exchange_time.date_naive();
    let open_today = exchange_time
        .timezone()
        .with_ymd_and_hms(day.year(), day.month(), day.day(), 9, 30, 0)
        .single();

    if let Some(open_today) = open_today
        && exchange_time < open_today
        && !matches!(day.weekday(), Weekday::Sat | Weekday::Sun)
    {
        return open_today;
    }

    loop {
        day = day.succ_opt().expect("date overflow");
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            return exchange_time
                .timezone()
                .with_ymd_and_hms(day.year(), day.month(), day.day(), 9, 30, 0)
                .single()
                .expect("valid open time");
        }
    }
}

/// Real wall-clock implementation, reading `Utc::now()` and projecting
/// into the configured exchange and local timezones.
pub struct SystemClock {
    pub exchange_tz: Tz,
    pub local_tz: Tz,
}

impl SystemClock {
    pub fn new(exchange_tz: Tz, local_tz: Tz) -> Self {
        Self {
            exchange_tz,
            local_tz,
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> WallClock {
        let utc: DateTime<Utc> = Utc::now();
        WallClock {
            exchange_time: utc.with_timezone(&self.exchange_tz),
            local_time: utc.with_timezone(&self.local_tz),
        }
    }
}

/// Deterministic clock for tests: always returns the same instant until
/// `set` is called.
pub struct FakeClock {
    pub fixed: std::sync::Mutex<WallClock>,
}

impl FakeClock {
    pub fn new(exchange_time: DateTime<Tz>, local_time: DateTime<Tz>) -> Self {
        Self {
            fixed: std::sync::Mutex::new(WallClock {
                exchange_time,
                local_time,
            }),
        }
    }

    pub fn set(&self, exchange_time: DateTime<Tz>, local_time: DateTime<Tz>) {
        *self.fixed.lock().unwrap() = WallClock {
            exchange_time,
            local_time,
        };
    }
}

impl Clock for FakeClock {
    fn now(&self) -> WallClock {
        *self.fixed.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;

    fn dt(y: i32, m: u32, d: u32, h: u32, mi: u32) -> DateTime<Tz> {
        New_York
            .with_ymd_and_hms(y, m, d, h, mi, 0)
            .single()
            .unwrap()
    }

    #[test]
    fn weekday_0930_is_market_hours() {
        assert!(is_market_hours_at(dt(2024, 6, 10, 9, 30)));
    }

    #[test]
    fn weekday_1600_is_still_market_hours() {
        assert!(is_market_hours_at(dt(2024, 6, 10, 16, 0)));
        assert_eq!(minutes_to_close_at(dt(2024, 6, 10, 16, 0)), 0);
    }

    #[test]
    fn weekday_1601_is_after_hours() {
        assert!(!is_market_hours_at(dt(2024, 6, 10, 16, 1)));
    }

    #[test]
    fn saturday_is_never_market_hours() {
        assert!(!is_market_hours_at(dt(2024, 6, 8, 12, 0)));
    }

    #[test]
    fn next_open_from_friday_close_is_monday() {
        let friday_after_close = dt(2024, 6, 7, 17, 0);
        let next = next_open_after(friday_after_close);
        assert_eq!(next.weekday(), Weekday::Mon);
    }
}
