//! Token-budgeted context selection.

use crate::session::Turn;

/// Cheap token estimate: characters / 4. Not exact tokenization.
pub fn estimate_tokens(turn: &Turn) -> usize {
    turn.content.chars().count() / 4
}

/// Picks the turns handed to the analysis collaborator.
///
/// Every system turn is included first and its cost charged to the budget.
/// Non-system turns are then taken newest to oldest until the next one would
/// not fit. The result is in chronological order. An oversized most-recent
/// turn yields only the system turns; it is never an error.
///
/// System turns are kept even when they alone exceed `max_tokens`.
pub fn select_for_analysis(turns: &[Turn], max_tokens: usize) -> Vec<Turn> {
    let system_cost: usize = turns
        .iter()
        .filter(|t| t.is_system())
        .map(estimate_tokens)
        .sum();
    let mut remaining = max_tokens.saturating_sub(system_cost);

    let mut keep = vec![false; turns.len()];
    for (i, turn) in turns.iter().enumerate() {
        if turn.is_system() {
            keep[i] = true;
        }
    }

    for (i, turn) in turns.iter().enumerate().rev() {
        if turn.is_system() {
            continue;
        }
        let cost = estimate_tokens(turn);
        if cost > remaining {
            break;
        }
        remaining -= cost;
        keep[i] = true;
    }

    turns
        .iter()
        .zip(keep)
        .filter_map(|(turn, kept)| kept.then(|| turn.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sized(label: usize, tokens: usize) -> Turn {
        let mut content = format!("{:04}", label);
        content.push_str(&"x".repeat(tokens * 4 - 4));
        Turn::user(content)
    }

    #[test]
    fn test_budget_1000_selects_four_most_recent() {
        let turns: Vec<Turn> = (0..20).map(|i| sized(i, 250)).collect();
        assert_eq!(estimate_tokens(&turns[0]), 250);

        let selected = select_for_analysis(&turns, 1000);

        assert_eq!(selected.len(), 4);
        let labels: Vec<&str> = selected.iter().map(|t| &t.content[..4]).collect();
        assert_eq!(labels, vec!["0016", "0017", "0018", "0019"]);
    }

    #[test]
    fn test_system_turns_always_included_and_charged() {
        let mut turns = vec![Turn::system("s".repeat(400))];
        turns.extend((0..10).map(|i| sized(i, 100)));

        let selected = select_for_analysis(&turns, 350);

        assert!(selected[0].is_system());
        // 350 - 100 for the system turn leaves room for two 100-token turns.
        assert_eq!(selected.len(), 3);
        assert!(selected[1].content.starts_with("0008"));
        assert!(selected[2].content.starts_with("0009"));
    }

    #[test]
    fn test_result_is_chronological_with_interleaved_system_turns() {
        let turns = vec![
            sized(0, 10),
            Turn::system("rule one"),
            sized(1, 10),
            sized(2, 10),
            Turn::system("rule two"),
            sized(3, 10),
        ];

        let selected = select_for_analysis(&turns, 1000);
        let contents: Vec<&str> = selected.iter().map(|t| t.content.as_str()).collect();
        let expected: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, expected);
    }

    #[test]
    fn test_oversized_latest_turn_returns_only_system_turns() {
        let turns = vec![
            Turn::system("rules"),
            sized(0, 10),
            sized(1, 5000),
        ];

        let selected = select_for_analysis(&turns, 100);

        assert_eq!(selected.len(), 1);
        assert!(selected[0].is_system());
    }

    #[test]
    fn test_selection_never_exceeds_budget() {
        let turns: Vec<Turn> = (0..30).map(|i| sized(i, 1 + (i * 7) % 40)).collect();
        for budget in [0, 1, 17, 64, 200, 999] {
            let selected = select_for_analysis(&turns, budget);
            let cost: usize = selected.iter().map(estimate_tokens).sum();
            assert!(cost <= budget, "budget {} exceeded: {}", budget, cost);
        }
    }
}
