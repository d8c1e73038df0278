//! Routing key matching.
//!
//! # Responsibilities
//! - Decide whether a routing key matches a binding pattern for an exchange kind
//! - Validate binding patterns before they enter a binding table
//!
//! # Design Decisions
//! - Fanout ignores the pattern entirely
//! - Direct is byte-exact and case-sensitive; the empty string is a valid key
//! - Topic patterns are split on `.`; `*` consumes exactly one segment and `#`
//!   consumes zero or more
//! - Topic matching simulates the wildcard NFA over segment positions, so
//!   `a.#.b` against `a.x.y.b` needs no backtracking and stays O(p * k)

use crate::broker::BrokerError;
use crate::routing::ExchangeKind;

const SEPARATOR: char = '.';
const ONE_SEGMENT: &str = "*";
const ANY_SEGMENTS: &str = "#";

/// Returns true if `routing_key` matches `pattern` under `kind` semantics.
pub fn matches(kind: ExchangeKind, pattern: &str, routing_key: &str) -> bool {
    match kind {
        ExchangeKind::Fanout => true,
        ExchangeKind::Direct => pattern == routing_key,
        ExchangeKind::Topic => topic_matches(pattern, routing_key),
    }
}

/// Check a binding pattern against the rules of `kind`.
pub fn validate_pattern(kind: ExchangeKind, pattern: &str) -> Result<(), BrokerError> {
    match kind {
        ExchangeKind::Fanout => Ok(()),
        ExchangeKind::Direct => {
            if pattern.contains(['*', '#']) {
                return Err(invalid(pattern, "wildcards are only allowed on topic exchanges"));
            }
            Ok(())
        }
        ExchangeKind::Topic => {
            for segment in pattern.split(SEPARATOR) {
                if segment == ONE_SEGMENT || segment == ANY_SEGMENTS {
                    continue;
                }
                if segment.contains(['*', '#']) {
                    return Err(invalid(pattern, "'*' and '#' must occupy a whole segment"));
                }
            }
            Ok(())
        }
    }
}

fn invalid(pattern: &str, reason: &'static str) -> BrokerError {
    BrokerError::InvalidPattern {
        pattern: pattern.to_string(),
        reason,
    }
}

fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let key: Vec<&str> = routing_key.split(SEPARATOR).collect();

    // reachable[j]: the pattern segments consumed so far can match key[..j]
    let mut reachable = vec![false; key.len() + 1];
    reachable[0] = true;

    for segment in pattern.split(SEPARATOR) {
        let mut next = vec![false; key.len() + 1];
        match segment {
            ANY_SEGMENTS => {
                let mut seen = false;
                for (j, slot) in next.iter_mut().enumerate() {
                    seen |= reachable[j];
                    *slot = seen;
                }
            }
            ONE_SEGMENT => {
                for j in 0..key.len() {
                    if reachable[j] {
                        next[j + 1] = true;
                    }
                }
            }
            literal => {
                for j in 0..key.len() {
                    if reachable[j] && key[j] == literal {
                        next[j + 1] = true;
                    }
                }
            }
        }

        if !next.contains(&true) {
            return false;
        }
        reachable = next;
    }

    reachable[key.len()]
}
