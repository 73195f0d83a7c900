pub const US_PER_SEC: u64 = 1_000_000;

/// convert a unix epoch time in microseconds to a NaiveDateTime
pub fn utc_time_from_us(time_us: u64) -> chrono::NaiveDateTime {
    chrono::DateTime::from_timestamp(
        (time_us / US_PER_SEC) as i64,
        ((time_us % US_PER_SEC) * 1_000) as u32,
    )
    .map(|t| t.naive_utc())
    .unwrap_or_default()
}
