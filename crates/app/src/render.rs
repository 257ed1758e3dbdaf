//! Plain-text rendering of a game for the console

use std::fmt::Write;

use poker_core::{Celebration, ConsensusLevel, GameView, StoryStatus};

pub const HELP: &str = "\
Commands (story numbers as listed by 'show'):
  story <title> [| description]   add a story
  select <n>                      make story n current
  start [n]                       open voting on story n (default: current)
  vote <card>                     vote 0 1 2 3 5 8 13 21 34 55 89 or ?
  reveal                          show everyone's cards
  reset                           clear votes and vote again
  finalize [estimate | -]         complete the current story (default: consensus)
  timer on [secs] | off | start   configure or start the countdown
  show                            print the game
  link                            copy the invite link
  help                            this text
  quit                            leave the game";

/// `m:ss`, clamped at zero
pub fn format_time(secs: i64) -> String {
    let secs = secs.max(0);
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Countdown lines worth printing: every ten seconds, then each of the last five
pub fn countdown_line(secs: i64) -> Option<String> {
    if secs <= 5 || secs % 10 == 0 {
        Some(format!("timer {}", format_time(secs)))
    } else {
        None
    }
}

fn level_name(level: ConsensusLevel) -> &'static str {
    match level {
        ConsensusLevel::Perfect => "perfect",
        ConsensusLevel::Strong => "strong",
        ConsensusLevel::None => "no",
    }
}

pub fn render_game(view: &GameView, remaining: Option<i64>) -> String {
    let game = view.game();
    let mut out = String::new();

    let _ = writeln!(out, "== {} ==  invite {}", game.name, game.invite_code);

    let _ = writeln!(out, "Players:");
    for player in &game.players {
        let me = if player.id == view.player_id() { "*" } else { " " };
        let mut tags = Vec::new();
        if player.is_host {
            tags.push("host");
        }
        if !player.is_active {
            tags.push("away");
        }
        let tags = if tags.is_empty() {
            String::new()
        } else {
            format!(" ({})", tags.join(", "))
        };
        let vote = match view.visible_vote(player) {
            Some(card) => card.to_string(),
            None if player.has_voted() => "voted".to_string(),
            None if view.is_voting() => "...".to_string(),
            None => "-".to_string(),
        };
        let _ = writeln!(out, " {} {}{}  [{}]", me, player.name, tags, vote);
    }

    if game.stories.is_empty() {
        let _ = writeln!(out, "No stories yet.");
    } else {
        let _ = writeln!(out, "Stories:");
        for (i, story) in game.stories.iter().enumerate() {
            let marker = if game.current_story_id == Some(story.id) { ">" } else { " " };
            let estimate = match &story.final_estimate {
                Some(estimate) => format!(" = {}", estimate),
                None => String::new(),
            };
            let _ = writeln!(
                out,
                " {} {}. {} [{}]{}",
                marker,
                i + 1,
                story.title,
                story.status.as_str(),
                estimate
            );
        }
    }

    if let Some(story) = view.current_story() {
        if let Some(description) = &story.description {
            let _ = writeln!(out, "  {}", description);
        }
        if story.status == StoryStatus::Voting && !view.is_revealed() {
            let active = game.players.iter().filter(|p| p.is_active).count();
            let _ = writeln!(out, "Votes: {}/{}", view.votes_cast(), active);
        }
    }

    if let Some(consensus) = view.consensus() {
        match consensus.value {
            Some(value) => {
                let _ = writeln!(
                    out,
                    "Consensus: {} ({}%, {} consensus)",
                    value,
                    consensus.percentage,
                    level_name(consensus.level)
                );
            }
            None => {
                let _ = writeln!(out, "No votes were cast.");
            }
        }
    }

    if let Some(secs) = remaining {
        let _ = writeln!(out, "Timer: {}", format_time(secs));
    } else if game.timer.enabled {
        let _ = writeln!(
            out,
            "Timer: {} (not running)",
            format_time(game.timer.duration_secs as i64)
        );
    }

    out.trim_end().to_string()
}

/// One-line announcement for a broadcast celebration
pub fn celebration(event: &Celebration, view: Option<&GameView>) -> String {
    let title = |story_id| {
        view.and_then(|v| v.game().story(story_id))
            .map(|s| s.title.clone())
            .unwrap_or_else(|| "story".to_string())
    };
    match event {
        Celebration::Consensus {
            story_id,
            value,
            percentage,
            level,
        } => format!(
            "*** {} consensus on '{}': {} ({}%) ***",
            level_name(*level),
            title(*story_id),
            value,
            percentage
        ),
        Celebration::EstimateFinalized { story_id, estimate } => match estimate {
            Some(estimate) => format!("*** '{}' estimated at {} ***", title(*story_id), estimate),
            None => format!("*** '{}' completed without an estimate ***", title(*story_id)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use poker_core::{CardValue, Estimate, Game, InviteCode, Player, Story, TimerSettings};
    use uuid::Uuid;

    fn sample(reveal: bool) -> (GameView, Uuid) {
        let game_id = Uuid::new_v4();
        let player = |name: &str, host: bool, vote: Option<CardValue>| Player {
            id: Uuid::new_v4(),
            game_id,
            name: name.to_string(),
            current_vote: vote,
            is_host: host,
            is_active: true,
            created_at: Utc::now(),
        };
        let story = |title: &str, status: StoryStatus, estimate: Option<Estimate>| Story {
            id: Uuid::new_v4(),
            game_id,
            title: title.to_string(),
            description: None,
            status,
            final_estimate: estimate,
            created_at: Utc::now(),
        };
        let alice = player("Alice", true, Some(CardValue::Eight));
        let bob = player("Bob", false, Some(CardValue::Eight));
        let done = story("Signup", StoryStatus::Completed, Some(Estimate::Card(CardValue::Three)));
        let current = story(
            "Login",
            if reveal { StoryStatus::Revealed } else { StoryStatus::Voting },
            None,
        );
        let game = Game {
            id: game_id,
            name: "Sprint 12".into(),
            invite_code: InviteCode::parse("ABCDEF").unwrap(),
            current_story_id: Some(current.id),
            players: vec![alice.clone(), bob],
            stories: vec![done, current.clone()],
            reveal_cards: reveal,
            timer: TimerSettings::default(),
            timer_end_time: None,
            created_at: Utc::now(),
        };
        (GameView::new(game, alice.id), current.id)
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0), "0:00");
        assert_eq!(format_time(9), "0:09");
        assert_eq!(format_time(75), "1:15");
        assert_eq!(format_time(600), "10:00");
        assert_eq!(format_time(-3), "0:00");
    }

    #[test]
    fn test_countdown_line() {
        assert_eq!(countdown_line(30).as_deref(), Some("timer 0:30"));
        assert_eq!(countdown_line(29), None);
        assert_eq!(countdown_line(3).as_deref(), Some("timer 0:03"));
    }

    #[test]
    fn test_render_hides_other_votes_until_reveal() {
        let (view, _) = sample(false);
        let text = render_game(&view, Some(42));
        assert!(text.contains("== Sprint 12 ==  invite ABCDEF"));
        assert!(text.contains("* Alice (host)  [8]"));
        assert!(text.contains("Bob  [voted]"));
        assert!(text.contains("  1. Signup [completed] = 3"));
        assert!(text.contains("> 2. Login [voting]"));
        assert!(text.contains("Votes: 2/2"));
        assert!(text.contains("Timer: 0:42"));
        assert!(!text.contains("Consensus"));
    }

    #[test]
    fn test_render_revealed_shows_consensus() {
        let (view, _) = sample(true);
        let text = render_game(&view, None);
        assert!(text.contains("Bob  [8]"));
        assert!(text.contains("Consensus: 8 (100%, perfect consensus)"));
    }

    #[test]
    fn test_celebration_text() {
        let (view, story_id) = sample(true);
        let consensus = Celebration::Consensus {
            story_id,
            value: CardValue::Eight,
            percentage: 100,
            level: ConsensusLevel::Perfect,
        };
        assert_eq!(
            celebration(&consensus, Some(&view)),
            "*** perfect consensus on 'Login': 8 (100%) ***"
        );

        let finalized = Celebration::EstimateFinalized {
            story_id: Uuid::new_v4(),
            estimate: None,
        };
        assert_eq!(
            celebration(&finalized, None),
            "*** 'story' completed without an estimate ***"
        );
    }
}
