use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod health;
pub mod room;
pub mod sse;
pub mod validation;

fn format_epoch_ms(ms: u64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000)
        .map(|instant| {
            instant
                .format(&Rfc3339)
                .unwrap_or_else(|_| "invalid-timestamp".into())
        })
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
