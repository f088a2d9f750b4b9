//! ---
//! rchan_section: "07-resilience-fault-tolerance"
//! rchan_subsection: "module"
//! rchan_type: "source"
//! rchan_scope: "code"
//! rchan_description: "Channel registry, health monitoring, and failover coordinators."
//! rchan_version: "v0.0.0-prealpha"
//! rchan_owner: "tbd"
//! ---
use std::cmp::{Ordering, Reverse};

use crate::channel::{ChannelSnapshot, ChannelStatus};

/// Decision produced by [`select_next`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Connect this idle channel.
    Candidate(String),
    /// No idle alternative; stay on the current active channel.
    KeepActive(String),
    /// Nothing to activate.
    Exhausted,
}

/// Order channels for failover: idle first, then by descending priority.
/// Equal keys keep registry order.
pub fn rank(channels: &[ChannelSnapshot]) -> Vec<&ChannelSnapshot> {
    let mut ranked: Vec<&ChannelSnapshot> = channels.iter().collect();
    ranked.sort_by(|a, b| rank_cmp(a, b));
    ranked
}

fn rank_cmp(a: &ChannelSnapshot, b: &ChannelSnapshot) -> Ordering {
    idle_rank(a.status)
        .cmp(&idle_rank(b.status))
        .then_with(|| Reverse(a.priority).cmp(&Reverse(b.priority)))
}

fn idle_rank(status: ChannelStatus) -> u8 {
    match status {
        ChannelStatus::Idle => 0,
        ChannelStatus::Connected | ChannelStatus::Unavailable => 1,
    }
}

/// Pick the next channel to activate.
///
/// `active` is never re-selected as a candidate.
pub fn select_next(channels: &[ChannelSnapshot], active: Option<&str>) -> Selection {
    let candidate = rank(channels)
        .into_iter()
        .find(|channel| channel.is_idle() && Some(channel.id.as_str()) != active);

    if let Some(channel) = candidate {
        return Selection::Candidate(channel.id.clone());
    }
    match active {
        Some(active) => Selection::KeepActive(active.to_owned()),
        None => Selection::Exhausted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: &str, status: ChannelStatus, priority: i32) -> ChannelSnapshot {
        ChannelSnapshot::new(id, priority, status)
    }

    #[test]
    fn idle_channel_beats_higher_priority_unavailable_one() {
        let channels = vec![
            snapshot("A", ChannelStatus::Idle, 0),
            snapshot("B", ChannelStatus::Idle, 2),
            snapshot("C", ChannelStatus::Unavailable, 5),
        ];
        assert_eq!(
            select_next(&channels, None),
            Selection::Candidate("B".into())
        );
    }

    #[test]
    fn ranking_orders_idle_then_priority_and_is_stable() {
        let channels = vec![
            snapshot("low", ChannelStatus::Idle, 0),
            snapshot("down", ChannelStatus::Unavailable, 9),
            snapshot("tie-a", ChannelStatus::Idle, 3),
            snapshot("tie-b", ChannelStatus::Idle, 3),
            snapshot("live", ChannelStatus::Connected, 1),
        ];
        let order: Vec<_> = rank(&channels).iter().map(|c| c.id.as_str()).collect();
        assert_eq!(order, vec!["tie-a", "tie-b", "low", "down", "live"]);
    }

    #[test]
    fn active_channel_is_never_reselected() {
        let channels = vec![
            snapshot("primary", ChannelStatus::Connected, 5),
            snapshot("backup", ChannelStatus::Idle, 1),
        ];
        assert_eq!(
            select_next(&channels, Some("primary")),
            Selection::Candidate("backup".into())
        );
    }

    #[test]
    fn keeps_active_when_no_idle_alternative() {
        let channels = vec![
            snapshot("primary", ChannelStatus::Connected, 5),
            snapshot("backup", ChannelStatus::Unavailable, 1),
        ];
        assert_eq!(
            select_next(&channels, Some("primary")),
            Selection::KeepActive("primary".into())
        );
    }

    #[test]
    fn exhausts_when_nothing_is_idle_or_active() {
        let channels = vec![
            snapshot("primary", ChannelStatus::Unavailable, 5),
            snapshot("backup", ChannelStatus::Unavailable, 1),
        ];
        assert_eq!(select_next(&channels, None), Selection::Exhausted);
        assert_eq!(select_next(&[], None), Selection::Exhausted);
    }
}
