use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// One chat line addressed to the joined channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub author: String,
    pub login: String,
    pub text: String,
    pub tags: HashMap<String, String>,
    pub at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IrcLine {
    /// Keep-alive; the payload must be echoed back in a PONG.
    Ping(String),
    Privmsg(ChatMessage),
    Other,
}

pub fn parse_line(line: &str, channel: &str) -> IrcLine {
    let line = line.trim_end_matches(|ch: char| ch == '\r' || ch == '\n');
    if let Some(token) = line.strip_prefix("PING ") {
        return IrcLine::Ping(token.to_owned());
    }
    match parse_privmsg(line, channel) {
        Some(message) => IrcLine::Privmsg(message),
        None => IrcLine::Other,
    }
}

pub fn pong_for(token: &str) -> String {
    format!("PONG {token}")
}

pub fn parse_privmsg(line: &str, expected_channel: &str) -> Option<ChatMessage> {
    let (tags, payload) = parse_irc_tags(line);
    let mut parts = payload.splitn(4, ' ');
    let prefix = parts.next()?;
    let command = parts.next()?;
    let target = parts.next()?;
    let trailing = parts.next()?;

    if !prefix.starts_with(':') || command != "PRIVMSG" {
        return None;
    }
    if normalize_channel(target) != normalize_channel(expected_channel) {
        return None;
    }

    let login = prefix[1..]
        .split('!')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if login.is_empty() {
        return None;
    }
    let text = trailing.strip_prefix(':')?.trim();
    if text.is_empty() {
        return None;
    }
    let author = tags
        .get("display-name")
        .filter(|value| !value.is_empty())
        .cloned()
        .unwrap_or_else(|| login.clone());

    Some(ChatMessage {
        author,
        login,
        text: text.to_owned(),
        tags,
        at: Utc::now(),
    })
}

/// Splits a leading `@k=v;k2=v2` block off the line. Keys without `=` map
/// to an empty value.
pub fn parse_irc_tags(line: &str) -> (HashMap<String, String>, &str) {
    let Some(stripped) = line.strip_prefix('@') else {
        return (HashMap::new(), line);
    };
    let Some(space_idx) = stripped.find(' ') else {
        return (HashMap::new(), line);
    };

    let tags_part = &stripped[..space_idx];
    let payload = &stripped[(space_idx + 1)..];
    let mut tags = HashMap::new();
    for pair in tags_part.split(';').filter(|pair| !pair.is_empty()) {
        match pair.split_once('=') {
            Some((key, value)) => tags.insert(key.to_owned(), decode_irc_tag_value(value)),
            None => tags.insert(pair.to_owned(), String::new()),
        };
    }
    (tags, payload)
}

/// IRCv3 tag unescaping. Unknown escapes keep the escaped character and a
/// trailing lone backslash is dropped.
fn decode_irc_tag_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut escaped = false;
    for ch in raw.chars() {
        if !escaped {
            if ch == '\\' {
                escaped = true;
            } else {
                out.push(ch);
            }
            continue;
        }
        escaped = false;
        out.push(match ch {
            's' => ' ',
            ':' => ';',
            'r' => '\r',
            'n' => '\n',
            other => other,
        });
    }
    out
}

/// Id of the first entry of an `emotes` tag (`id:0-4,6-10/id2:12-16`).
pub fn first_native_emote_id(emotes_tag: &str) -> Option<&str> {
    emotes_tag
        .split('/')
        .filter_map(|entry| entry.split(':').next())
        .map(str::trim)
        .find(|id| !id.is_empty())
}

/// Channel login as used in `JOIN` and provider URLs: no `#`, lowercase.
pub fn normalize_channel(value: &str) -> String {
    let value = value.trim();
    value.strip_prefix('#').unwrap_or(value).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::{
        decode_irc_tag_value, first_native_emote_id, normalize_channel, parse_irc_tags,
        parse_line, parse_privmsg, pong_for, IrcLine,
    };

    #[test]
    fn parses_privmsg_with_display_name() {
        let line = "@display-name=Foo;emotes= :foo!foo@foo PRIVMSG #bar :hello Kappa";
        let parsed = parse_privmsg(line, "bar").expect("expected parse");
        assert_eq!(parsed.author, "Foo");
        assert_eq!(parsed.login, "foo");
        assert_eq!(parsed.text, "hello Kappa");
        assert_eq!(parsed.tag("emotes"), Some(""));
    }

    #[test]
    fn falls_back_to_login_without_display_name() {
        let line = ":viewer!viewer@viewer.tmi.twitch.tv PRIVMSG #Bar :hi";
        let parsed = parse_privmsg(line, "#bar").expect("expected parse");
        assert_eq!(parsed.author, "viewer");
    }

    #[test]
    fn emote_lines_for_other_channels_are_dropped() {
        let line = "@emotes=25:0-4 :foo!foo@foo PRIVMSG #somebody_else :Kappa";
        assert!(parse_privmsg(line, "core_dmp").is_none());
        assert_eq!(parse_line(line, "#core_dmp"), IrcLine::Other);
    }

    #[test]
    fn non_privmsg_lines_are_other() {
        let join = ":foo!foo@foo.tmi.twitch.tv JOIN #bar";
        assert_eq!(parse_line(join, "bar"), IrcLine::Other);
        let numeric = ":tmi.twitch.tv 001 justinfan12345 :Welcome, GLHF!";
        assert_eq!(parse_line(numeric, "bar"), IrcLine::Other);
        assert_eq!(parse_line("garbage", "bar"), IrcLine::Other);
        assert_eq!(parse_line("", "bar"), IrcLine::Other);
    }

    #[test]
    fn ping_is_answered_verbatim() {
        match parse_line("PING :tmi.twitch.tv\r", "bar") {
            IrcLine::Ping(token) => assert_eq!(pong_for(&token), "PONG :tmi.twitch.tv"),
            other => panic!("expected ping, got {other:?}"),
        }
    }

    #[test]
    fn tags_without_equals_get_empty_value() {
        let (tags, payload) = parse_irc_tags("@flag;badge-info=;mod=1 :x PRIVMSG #y :z");
        assert_eq!(tags.get("flag").map(String::as_str), Some(""));
        assert_eq!(tags.get("badge-info").map(String::as_str), Some(""));
        assert_eq!(tags.get("mod").map(String::as_str), Some("1"));
        assert_eq!(payload, ":x PRIVMSG #y :z");
    }

    #[test]
    fn escaped_display_name_and_emotes_tag_decode() {
        let line = "@display-name=Emote\\sEnjoyer;emotes=25:0-4;system-msg=hi\\:there\\ :foo!foo@foo PRIVMSG #bar :Kappa";
        let parsed = parse_privmsg(line, "bar").expect("expected parse");
        assert_eq!(parsed.author, "Emote Enjoyer");
        assert_eq!(parsed.tag("emotes"), Some("25:0-4"));
        assert_eq!(parsed.tag("system-msg"), Some("hi;there"));
        assert_eq!(decode_irc_tag_value("peepo\\qHappy"), "peepoqHappy");
    }

    #[test]
    fn first_native_emote_takes_first_entry() {
        assert_eq!(first_native_emote_id("25:0-4"), Some("25"));
        assert_eq!(first_native_emote_id("25:0-4,12-16/1902:6-10"), Some("25"));
        assert_eq!(first_native_emote_id(""), None);
    }

    #[test]
    fn channel_names_match_join_and_provider_form() {
        assert_eq!(normalize_channel(" #Core_Dmp"), "core_dmp");
        assert_eq!(normalize_channel("forsen"), "forsen");
        assert_eq!(normalize_channel("##x"), "#x");
    }
}
