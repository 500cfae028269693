use crate::calendar::{MutationKind, Phase};

// ── Booking mutations ───────────────────────────────────────────

/// Counter: finished mutation attempts. Labels: kind, outcome.
pub const MUTATIONS_TOTAL: &str = "studiodesk_mutations_total";

/// Counter: attempts stopped by the local conflict check.
pub const CONFLICTS_TOTAL: &str = "studiodesk_conflicts_total";

/// Histogram: backend call latency in seconds. Labels: op.
pub const REMOTE_CALL_DURATION_SECONDS: &str = "studiodesk_remote_call_duration_seconds";

// ── Reference backend ───────────────────────────────────────────

/// Histogram: WAL append + fsync duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "studiodesk_wal_flush_duration_seconds";

pub fn kind_label(kind: MutationKind) -> &'static str {
    match kind {
        MutationKind::Create => "create",
        MutationKind::Move => "move",
        MutationKind::Resize => "resize",
        MutationKind::EditFields => "edit_fields",
        MutationKind::Delete => "delete",
    }
}

pub fn outcome_label(phase: Phase) -> &'static str {
    match phase {
        Phase::Committed => "committed",
        Phase::RolledBack => "rolled_back",
        Phase::Idle | Phase::PendingLocalApply | Phase::AwaitingRemote => "in_flight",
    }
}
