/// Result of a regeneration catch-up: the lives after accrual, the new
/// accrual anchor, and when the next life lands (only meaningful below cap).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegenOutcome {
    pub lives: i64,
    pub last_regen_at_ms: i64,
    pub next_life_at_ms: Option<i64>,
}

/// Accrue whole regeneration intervals elapsed since `last_regen_at_ms`,
/// one life each, up to `max_lives`. Lives already above the cap (bonus
/// credits) are preserved untouched; the anchor still advances so time at
/// or above cap never banks future lives.
pub fn accrue(
    lives: i64,
    max_lives: i64,
    last_regen_at_ms: i64,
    interval_ms: i64,
    now_ms: i64,
) -> RegenOutcome {
    if interval_ms <= 0 {
        return RegenOutcome {
            lives,
            last_regen_at_ms,
            next_life_at_ms: None,
        };
    }

    if lives >= max_lives {
        return RegenOutcome {
            lives,
            last_regen_at_ms: now_ms.max(last_regen_at_ms),
            next_life_at_ms: None,
        };
    }

    let elapsed_ms = now_ms - last_regen_at_ms;
    if elapsed_ms < 0 {
        // Clock went backwards relative to the anchor; hold position.
        return RegenOutcome {
            lives,
            last_regen_at_ms,
            next_life_at_ms: Some(last_regen_at_ms + interval_ms),
        };
    }

    let whole_intervals = elapsed_ms / interval_ms;
    let gained = whole_intervals.min(max_lives - lives);
    let lives_after = lives + gained;

    if lives_after >= max_lives {
        RegenOutcome {
            lives: lives_after,
            last_regen_at_ms: now_ms,
            next_life_at_ms: None,
        }
    } else {
        let anchor = last_regen_at_ms + whole_intervals * interval_ms;
        RegenOutcome {
            lives: lives_after,
            last_regen_at_ms: anchor,
            next_life_at_ms: Some(anchor + interval_ms),
        }
    }
}
