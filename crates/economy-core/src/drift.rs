use contracts::ClockInfo;

/// Single-sample offset estimate: how far the server clock sits ahead of
/// the client's. The uplink latency is folded in, so this is an upper
/// bound; the response carries both server timestamps so the client can
/// halve the round trip itself on the next exchange.
pub fn offset_estimate_ms(client_sent_at_ms: Option<i64>, server_received_at_ms: i64) -> Option<i64> {
    client_sent_at_ms.map(|sent| server_received_at_ms - sent)
}

pub fn clock_info(
    client_sent_at_ms: Option<i64>,
    server_received_at_ms: i64,
    server_responded_at_ms: i64,
) -> ClockInfo {
    ClockInfo {
        server_received_at_ms,
        server_responded_at_ms,
        offset_estimate_ms: offset_estimate_ms(client_sent_at_ms, server_received_at_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_is_server_minus_client() {
        assert_eq!(offset_estimate_ms(Some(1_000), 1_250), Some(250));
        // A client clock running ahead of the server yields a negative offset.
        assert_eq!(offset_estimate_ms(Some(2_000), 1_250), Some(-750));
    }

    #[test]
    fn offset_absent_without_client_timestamp() {
        let info = clock_info(None, 500, 510);
        assert_eq!(info.offset_estimate_ms, None);
        assert_eq!(info.server_received_at_ms, 500);
        assert_eq!(info.server_responded_at_ms, 510);
    }
}
