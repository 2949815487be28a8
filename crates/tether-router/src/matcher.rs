//! Trigger matching
//!
//! The pure predicate deciding whether one inbound platform message fires
//! one subscriber. Checks run cheapest first and short-circuit; the
//! pattern regex is built last.

use regex::RegexBuilder;
use tracing::warn;

use tether_core::{ChatMessage, MatchKind, MessageFilter};

/// Does `message` fire a subscriber with `filter`?
///
/// `bot_user_id` is this connection's own user id; it drives
/// self-suppression and the `bot-mentioned` pattern.
pub fn matches(message: &ChatMessage, filter: &MessageFilter, bot_user_id: Option<&str>) -> bool {
    // Authorship: platform-authored messages are skipped unless the
    // subscriber opted in, and the bot's own messages are always skipped.
    if !filter.allow_other_bots {
        if message.author.bot || message.author.system {
            return false;
        }
    } else if bot_user_id.is_some() && bot_user_id == Some(message.author.id.as_str()) {
        return false;
    }

    if !filter.role_ids.is_empty() {
        let holds_one = filter
            .role_ids
            .iter()
            .any(|role| message.author_role_ids.contains(role));
        if !holds_one {
            return false;
        }
    }

    // Channel filter is substring-or-equality against the message's
    // channel id.
    if !filter.channel_ids.is_empty() {
        let in_channel = filter
            .channel_ids
            .iter()
            .any(|channel| message.channel_id.contains(channel.as_str()));
        if !in_channel {
            return false;
        }
    }

    if filter.require_reply && message.reply_to.is_none() {
        return false;
    }

    if filter.pattern == MatchKind::BotMentioned {
        return bot_user_id
            .map(|id| message.mentioned_user_ids.iter().any(|m| m == id))
            .unwrap_or(false);
    }

    // Nothing to test a pattern against, except match-all which fires on
    // anything.
    if message.content.is_empty() && filter.pattern != MatchKind::MatchAll {
        return false;
    }

    let source = match filter.pattern {
        MatchKind::Equals => format!("^{}$", regex::escape(&filter.value)),
        MatchKind::StartsWith => format!("^{}", regex::escape(&filter.value)),
        MatchKind::EndsWith => format!("{}$", regex::escape(&filter.value)),
        MatchKind::Contains => regex::escape(&filter.value),
        MatchKind::Regex => filter.value.clone(),
        MatchKind::MatchAll => ".*".to_string(),
        MatchKind::BotMentioned => unreachable!("handled above"),
    };

    match RegexBuilder::new(&source)
        .case_insensitive(!filter.case_sensitive)
        .build()
    {
        Ok(re) => re.is_match(&message.content),
        Err(e) => {
            warn!("invalid trigger pattern {:?}: {}", source, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::ChatUser;

    fn message(content: &str) -> ChatMessage {
        ChatMessage {
            id: "m1".into(),
            channel_id: "chan-1".into(),
            content: content.into(),
            author: ChatUser {
                id: "u1".into(),
                name: "alice".into(),
                bot: false,
                system: false,
            },
            ..Default::default()
        }
    }

    fn filter(pattern: MatchKind, value: &str) -> MessageFilter {
        MessageFilter {
            pattern,
            value: value.into(),
            ..MessageFilter::match_all()
        }
    }

    #[test]
    fn pattern_table() {
        let cases: &[(MatchKind, &str, bool, &str, bool)] = &[
            // (pattern, value, case_sensitive, content, expected)
            (MatchKind::StartsWith, "!ping", false, "!PING now", true),
            (MatchKind::StartsWith, "!ping", false, "ok !ping", false),
            (MatchKind::Equals, "deploy", false, "deploy", true),
            (MatchKind::Equals, "deploy", false, "deploy ", false),
            (MatchKind::EndsWith, "done", false, "all done", true),
            (MatchKind::EndsWith, "done", false, "done already", false),
            (MatchKind::Contains, "hello", false, "say hello world", true),
            (MatchKind::Contains, "hello", false, "goodbye", false),
            (MatchKind::Regex, r"^\d+$", false, "12345", true),
            (MatchKind::Regex, r"^\d+$", false, "12a", false),
            (MatchKind::MatchAll, "", false, "anything", true),
            (MatchKind::MatchAll, "", false, "", true),
        ];
        for (pattern, value, case_sensitive, content, expected) in cases {
            let mut f = filter(*pattern, value);
            f.case_sensitive = *case_sensitive;
            assert_eq!(
                matches(&message(content), &f, Some("bot-user")),
                *expected,
                "pattern {:?} value {:?} content {:?}",
                pattern,
                value,
                content
            );
        }
    }

    #[test]
    fn case_sensitivity_is_opt_in() {
        let mut f = filter(MatchKind::Equals, "Deploy");
        assert!(matches(&message("deploy"), &f, None));
        f.case_sensitive = true;
        assert!(!matches(&message("deploy"), &f, None));
        assert!(matches(&message("Deploy"), &f, None));
    }

    #[test]
    fn escaping_keeps_literal_metacharacters_literal() {
        let f = filter(MatchKind::Contains, "1+1?");
        assert!(matches(&message("ask 1+1?"), &f, None));
        assert!(!matches(&message("11"), &f, None));
    }

    #[test]
    fn invalid_user_regex_never_fires() {
        let f = filter(MatchKind::Regex, "([unclosed");
        assert!(!matches(&message("([unclosed"), &f, None));
    }

    #[test]
    fn bot_mentioned_ignores_content() {
        let f = filter(MatchKind::BotMentioned, "");
        let mut msg = message("whatever text at all");
        assert!(!matches(&msg, &f, Some("bot-user")));

        msg.mentioned_user_ids = vec!["bot-user".into()];
        assert!(matches(&msg, &f, Some("bot-user")));

        // Without a known own id there is nothing to be mentioned as.
        assert!(!matches(&msg, &f, None));
    }

    #[test]
    fn bot_authors_are_skipped_unless_opted_in() {
        let mut msg = message("!ping");
        msg.author.bot = true;
        let mut f = filter(MatchKind::StartsWith, "!ping");
        assert!(!matches(&msg, &f, Some("bot-user")));

        f.allow_other_bots = true;
        assert!(matches(&msg, &f, Some("bot-user")));

        // Opting in never includes this bot itself.
        msg.author.id = "bot-user".into();
        assert!(!matches(&msg, &f, Some("bot-user")));
    }

    #[test]
    fn role_and_channel_filters_compose() {
        let f = MessageFilter {
            role_ids: vec!["R1".into()],
            channel_ids: vec!["C1".into()],
            ..filter(MatchKind::MatchAll, "")
        };

        // Right role, wrong channel: no fire.
        let mut msg = message("hi");
        msg.channel_id = "C2".into();
        msg.author_role_ids = vec!["R1".into()];
        assert!(!matches(&msg, &f, None));

        msg.channel_id = "C1".into();
        assert!(matches(&msg, &f, None));

        msg.author_role_ids = vec!["R9".into()];
        assert!(!matches(&msg, &f, None));
    }

    #[test]
    fn channel_filter_matches_on_substring() {
        let f = MessageFilter {
            channel_ids: vec!["123".into()],
            ..filter(MatchKind::MatchAll, "")
        };
        let mut msg = message("hi");
        msg.channel_id = "channel-123-general".into();
        assert!(matches(&msg, &f, None));
    }

    #[test]
    fn reply_required_needs_a_reference() {
        let f = MessageFilter {
            require_reply: true,
            ..filter(MatchKind::MatchAll, "")
        };
        let mut msg = message("answer");
        assert!(!matches(&msg, &f, None));
        msg.reply_to = Some("m0".into());
        assert!(matches(&msg, &f, None));
    }

    #[test]
    fn empty_content_only_fires_match_all() {
        assert!(!matches(
            &message(""),
            &filter(MatchKind::Contains, ""),
            None
        ));
        assert!(matches(&message(""), &filter(MatchKind::MatchAll, ""), None));
    }
}
