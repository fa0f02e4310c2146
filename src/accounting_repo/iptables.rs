// iptables command lines and the counter text contract.

use crate::models::Direction;
use crate::pipeline::CommandSpec;

/// Every (chain, match) combination a stale accounting rule may have been installed with.
pub(super) const RULE_PATTERNS: [(&str, &str); 4] = [
    ("INPUT", "--dport"),
    ("INPUT", "--sport"),
    ("OUTPUT", "--dport"),
    ("OUTPUT", "--sport"),
];

fn rule_args(action: &str, chain: &str, flag: &str, port: u16) -> Vec<String> {
    vec![
        action.to_string(),
        chain.to_string(),
        "-p".to_string(),
        "tcp".to_string(),
        flag.to_string(),
        port.to_string(),
    ]
}

/// `iptables -A <chain> -p tcp <--dport|--sport> <port>`
pub(super) fn append_rule(binary: &str, direction: Direction, port: u16) -> CommandSpec {
    CommandSpec::new(
        binary,
        rule_args("-A", direction.chain(), direction.port_flag(), port),
    )
}

/// `iptables -D <chain> -p tcp <flag> <port>`; removes one matching rule per call.
pub(super) fn delete_rule(binary: &str, chain: &str, flag: &str, port: u16) -> CommandSpec {
    CommandSpec::new(binary, rule_args("-D", chain, flag, port))
}

/// Dump the rule table with exact byte counts, keep the first row for the port and
/// direction, and print its byte column.
///
/// `-w` keeps `dpt:80` from matching `dpt:8080`.
pub(super) fn counter_pipeline(binary: &str, port: u16, direction: Direction) -> Vec<CommandSpec> {
    vec![
        CommandSpec::new(binary, ["-L", "-v", "-n", "-x"]),
        CommandSpec::new("grep", ["-w".to_string(), direction.row_selector(port)]),
        CommandSpec::new("awk", ["{print $2}"]),
        CommandSpec::new("head", ["-n", "1"]),
    ]
}

/// Parses the byte-count text produced by [`counter_pipeline`].
/// Returns `None` unless the trimmed text is a non-negative integer that fits in i64.
pub fn parse_counter(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse::<i64>().ok()
}
