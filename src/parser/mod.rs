use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};

/// One decoded syslog message. Every field the wire may omit or mangle is an
/// `Option`; the decoder never fails on a malformed optional field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMessage {
    pub priority: Option<u32>,
    pub timestamp: Option<DateTime<Utc>>,
    pub hostname: Option<String>,
    pub container_id: Option<String>,
    pub content: Option<String>,
}

impl RawMessage {
    /// Source identifier for resolution: the container id from the message
    /// tag, falling back to the hostname field.
    pub fn source_id(&self) -> Option<&str> {
        self.container_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .or(self.hostname.as_deref().filter(|h| !h.is_empty()))
    }
}

/// Lenient syslog line decoder.
///
/// Accepts the classic BSD shape `<PRI>TIMESTAMP HOST TAG[PID]: MSG` with an
/// RFC3339 or RFC3164 timestamp. Fields that fail to parse are left absent
/// instead of rejecting the message; validation decides later what is
/// required. Returns `None` only for a line with no content at all.
pub fn parse_message(line: &str) -> Option<RawMessage> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return None;
    }

    let mut msg = RawMessage::default();
    let mut rest = line;

    if let Some((priority, after)) = take_priority(rest) {
        msg.priority = Some(priority);
        rest = after;
    }

    if let Some((ts, after)) = take_timestamp(rest.trim_start()) {
        msg.timestamp = Some(ts);
        rest = after;
    }

    let rest = rest.trim_start();
    if msg.priority.is_some() || msg.timestamp.is_some() {
        match rest.split_once(' ') {
            Some((host, tail)) => {
                msg.hostname = non_empty(host);
                let tail = tail.trim_start();
                if tail.contains(':') {
                    let (tag, content) = take_tag(tail);
                    msg.container_id = tag;
                    msg.content = content;
                } else {
                    msg.content = non_empty(tail);
                }
            }
            None => msg.content = non_empty(rest),
        }
    } else if !rest.is_empty() {
        // No recognizable header at all; treat the whole line as payload.
        msg.content = Some(rest.to_string());
    }

    Some(msg)
}

fn take_priority(input: &str) -> Option<(u32, &str)> {
    let body = input.strip_prefix('<')?;
    let (digits, rest) = body.split_once('>')?;
    if digits.is_empty() || digits.len() > 3 {
        return None;
    }
    let priority = digits.parse().ok()?;
    Some((priority, rest))
}

fn take_timestamp(input: &str) -> Option<(DateTime<Utc>, &str)> {
    // RFC3339 first: single token, self-delimiting.
    let token = input.split_whitespace().next()?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(token) {
        return Some((ts.with_timezone(&Utc), &input[token.len()..]));
    }
    take_rfc3164_timestamp(input)
}

/// `Jan  2 15:04:05`: month name, space-padded day, time. The format omits
/// the year, so the current year is assumed.
fn take_rfc3164_timestamp(input: &str) -> Option<(DateTime<Utc>, &str)> {
    const LEN: usize = "Jan  2 15:04:05".len();
    if input.len() < LEN || !input.is_char_boundary(LEN) {
        return None;
    }
    let (stamp, rest) = input.split_at(LEN);
    let mut parts = stamp.split_whitespace();
    let month = match parts.next()? {
        "Jan" => 1,
        "Feb" => 2,
        "Mar" => 3,
        "Apr" => 4,
        "May" => 5,
        "Jun" => 6,
        "Jul" => 7,
        "Aug" => 8,
        "Sep" => 9,
        "Oct" => 10,
        "Nov" => 11,
        "Dec" => 12,
        _ => return None,
    };
    let day: u32 = parts.next()?.parse().ok()?;
    let mut clock = parts.next()?.split(':');
    let hour: u32 = clock.next()?.parse().ok()?;
    let minute: u32 = clock.next()?.parse().ok()?;
    let second: u32 = clock.next()?.parse().ok()?;
    let date = NaiveDate::from_ymd_opt(Utc::now().year(), month, day)?;
    let naive = date.and_hms_opt(hour, minute, second)?;
    Some((Utc.from_utc_datetime(&naive), rest))
}

/// Splits `TAG[PID]: MSG` or `TAG: MSG`. The tag carries the container id
/// when the runtime's syslog driver is configured that way.
fn take_tag(input: &str) -> (Option<String>, Option<String>) {
    let Some((head, content)) = input.split_once(':') else {
        return (None, non_empty(input));
    };
    // A malformed header can leave stray tokens before the tag; the tag is
    // whatever directly precedes the colon.
    let tag_token = head.rsplit(' ').next().unwrap_or(head);
    let tag = match tag_token.split_once('[') {
        Some((name, _pid)) => name,
        None => tag_token,
    };
    let content = content.strip_prefix(' ').unwrap_or(content);
    (non_empty(tag), non_empty(content))
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
