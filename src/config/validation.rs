//! Field validation.
//!
//! # Responsibilities
//! - Evaluate per-field rules (`!empty`, `ipv4`, `mac`, `uts`, `port`, `max=N`)
//! - Recurse into nested entities (`struct`) and lists of entities (`slice`)
//! - Apply ignore-sets that suppress sub-fields irrelevant to the embedding parent
//!
//! # Design Decisions
//! - Rules are declared in a static table per entity (`Validate::fields`), not parsed from strings
//! - Ignore-sets compose down the recursion: inherited ∪ the field's own
//! - Stops at the first failing rule and reports it with the dotted field path
//! - Field validation never looks at sibling entities; see `sanity.rs` for that

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

static IPV4: LazyLock<Regex> = LazyLock::new(|| pattern(r"^(\d{1,3}\.){3}\d{1,3}$"));
static MAC: LazyLock<Regex> = LazyLock::new(|| pattern(r"^([a-fA-F0-9]{2}:){5}[a-fA-F0-9]{2}$"));
static UTS: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"^(([a-zA-Z0-9\-_])+\.)*([a-zA-Z0-9\-_])+\.([a-zA-Z])+$"));

fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("built-in pattern compiles")
}

/// Highest port number accepted by the `port` rule.
pub const MAX_PORT: u64 = 65535;

/// A single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// The string is empty.
    Empty,
    /// Dotted quad.
    Ipv4,
    /// Colon separated hex MAC address.
    Mac,
    /// FQDN-like name with at least one dot.
    Uts,
    /// Unsigned integer below 65536.
    Port,
    /// At most N characters.
    Max(usize),
    /// Recurse into a nested entity.
    Struct,
    /// Recurse into every element of a list.
    Slice,
}

/// A rule with optional negation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Directive {
    pub rule: Rule,
    pub negate: bool,
}

impl Directive {
    pub const fn is(rule: Rule) -> Self {
        Self { rule, negate: false }
    }

    pub const fn not(rule: Rule) -> Self {
        Self { rule, negate: true }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negate {
            f.write_str("!")?;
        }
        match self.rule {
            Rule::Empty => f.write_str("empty"),
            Rule::Ipv4 => f.write_str("ipv4"),
            Rule::Mac => f.write_str("mac"),
            Rule::Uts => f.write_str("uts"),
            Rule::Port => f.write_str("port"),
            Rule::Max(n) => write!(f, "max={n}"),
            Rule::Struct => f.write_str("struct"),
            Rule::Slice => f.write_str("slice"),
        }
    }
}

/// Field validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    /// A directive evaluated to false.
    #[error("validation failed: {directive} for {path} ({value:?})")]
    Failed {
        path: String,
        directive: Directive,
        value: String,
    },

    /// The value cannot be interpreted by the directive (e.g. a non-numeric port).
    #[error("invalid value for {directive} at {path}: {value:?}")]
    Unparsable {
        path: String,
        directive: Directive,
        value: String,
    },

    /// The directive does not apply to this kind of value.
    #[error("{directive} not supported for {path}")]
    Unsupported { path: String, directive: Directive },
}

/// The value a field exposes to the rule engine.
pub enum Value<'a> {
    Text(&'a str),
    Entity(&'a dyn Validate),
    Entities(Vec<&'a dyn Validate>),
    /// An optional entity that is not present; nothing to validate.
    Absent,
}

/// One row of an entity's rule table.
pub struct Field<'a> {
    pub name: &'static str,
    pub value: Value<'a>,
    pub rules: &'static [Directive],
    /// Sub-fields to skip below this field.
    pub ignore: &'static [&'static str],
}

const STRUCT: &[Directive] = &[Directive::is(Rule::Struct)];
const SLICE: &[Directive] = &[Directive::is(Rule::Slice)];

impl<'a> Field<'a> {
    pub fn text(name: &'static str, value: &'a str, rules: &'static [Directive]) -> Self {
        Self {
            name,
            value: Value::Text(value),
            rules,
            ignore: &[],
        }
    }

    pub fn nested<T: Validate>(name: &'static str, value: &'a T) -> Self {
        Self {
            name,
            value: Value::Entity(value),
            rules: STRUCT,
            ignore: &[],
        }
    }

    pub fn each<T: Validate>(name: &'static str, items: &'a [T]) -> Self {
        Self {
            name,
            value: Value::Entities(items.iter().map(|i| i as &dyn Validate).collect()),
            rules: SLICE,
            ignore: &[],
        }
    }

    pub fn optional<T: Validate>(name: &'static str, value: Option<&'a T>) -> Self {
        Self {
            name,
            value: value.map_or(Value::Absent, |v| Value::Entity(v as &dyn Validate)),
            rules: STRUCT,
            ignore: &[],
        }
    }

    /// Skip the named sub-fields when recursing into this field.
    pub fn ignoring(mut self, ignore: &'static [&'static str]) -> Self {
        self.ignore = ignore;
        self
    }
}

/// Implemented by every entity with a rule table.
pub trait Validate {
    fn fields(&self) -> Vec<Field<'_>>;
}

/// Validate `entity` depth first, skipping any field named in `ignore`.
pub fn validate(entity: &dyn Validate, ignore: &[&str]) -> Result<(), RuleError> {
    walk(entity, ignore, "")
}

fn walk(entity: &dyn Validate, ignore: &[&str], prefix: &str) -> Result<(), RuleError> {
    for field in entity.fields() {
        if ignore.contains(&field.name) {
            continue;
        }
        let path = if prefix.is_empty() {
            field.name.to_string()
        } else {
            format!("{prefix}.{}", field.name)
        };

        let inherited: Vec<&str> = ignore.iter().chain(field.ignore).copied().collect();
        for directive in field.rules {
            apply(*directive, &field.value, &inherited, &path)?;
        }
    }
    Ok(())
}

fn apply(directive: Directive, value: &Value<'_>, ignore: &[&str], path: &str) -> Result<(), RuleError> {
    let unsupported = || RuleError::Unsupported {
        path: path.to_string(),
        directive,
    };

    match (directive.rule, value) {
        (Rule::Struct, Value::Entity(entity)) => walk(*entity, ignore, path),
        (Rule::Struct, Value::Absent) => Ok(()),
        (Rule::Slice, Value::Entities(items)) => {
            for (i, item) in items.iter().enumerate() {
                walk(*item, ignore, &format!("{path}[{i}]"))?;
            }
            Ok(())
        }
        (Rule::Struct | Rule::Slice, _) => Err(unsupported()),
        (rule, Value::Text(text)) => {
            let holds = check(rule, text).ok_or_else(|| RuleError::Unparsable {
                path: path.to_string(),
                directive,
                value: text.to_string(),
            })?;
            if holds != directive.negate {
                Ok(())
            } else {
                Err(RuleError::Failed {
                    path: path.to_string(),
                    directive,
                    value: text.to_string(),
                })
            }
        }
        _ => Err(unsupported()),
    }
}

/// Evaluate a leaf rule. `None` when the text cannot be interpreted.
fn check(rule: Rule, text: &str) -> Option<bool> {
    match rule {
        Rule::Empty => Some(text.is_empty()),
        Rule::Ipv4 => Some(IPV4.is_match(text)),
        Rule::Mac => Some(MAC.is_match(text)),
        Rule::Uts => Some(UTS.is_match(text)),
        Rule::Port => text.parse::<u64>().ok().map(|port| port <= MAX_PORT),
        Rule::Max(n) => Some(text.chars().count() <= n),
        Rule::Struct | Rule::Slice => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{Gateway, Host, IpV4, Network, Server};

    fn ipv4(address: &str, subnet: &str, mac: &str, port: &str) -> IpV4 {
        IpV4 {
            address: address.into(),
            subnet: subnet.into(),
            mac: mac.into(),
            port: port.into(),
        }
    }

    fn host() -> Host {
        Host {
            name: "h1".into(),
            ipv4: ipv4("10.0.0.5", "", "aa:bb:cc:dd:ee:ff", ""),
            utsname: "h1.example.com".into(),
            network: String::new(),
        }
    }

    fn network() -> Network {
        Network {
            name: "net1".into(),
            kind: "production".into(),
            ipv4: ipv4("10.0.0.1", "255.255.255.0", "", ""),
            gateway: Gateway {
                ipv4: ipv4("10.0.0.254", "", "", ""),
            },
            hosts: vec![host()],
            server: String::new(),
        }
    }

    #[test]
    fn leaf_rules() {
        assert_eq!(check(Rule::Ipv4, "192.168.0.1"), Some(true));
        assert_eq!(check(Rule::Ipv4, "192.168.0"), Some(false));
        assert_eq!(check(Rule::Mac, "AA:bb:0c:dd:ee:ff"), Some(true));
        assert_eq!(check(Rule::Mac, "aa-bb-cc-dd-ee-ff"), Some(false));
        assert_eq!(check(Rule::Uts, "h1.example.com"), Some(true));
        assert_eq!(check(Rule::Uts, "localhost"), Some(false));
        assert_eq!(check(Rule::Port, "65535"), Some(true));
        assert_eq!(check(Rule::Port, "65536"), Some(false));
        assert_eq!(check(Rule::Port, "http"), None);
        assert_eq!(check(Rule::Max(3), "abc"), Some(true));
        assert_eq!(check(Rule::Max(3), "abcd"), Some(false));
    }

    #[test]
    fn directives_render_like_tags() {
        assert_eq!(Directive::not(Rule::Empty).to_string(), "!empty");
        assert_eq!(Directive::is(Rule::Max(15)).to_string(), "max=15");
    }

    #[test]
    fn valid_network_passes() {
        assert_eq!(validate(&network(), &[]), Ok(()));
    }

    #[test]
    fn failure_carries_field_path() {
        let mut network = network();
        network.hosts[0].ipv4.mac = "zz".into();

        match validate(&network, &[]) {
            Err(RuleError::Failed { path, directive, value }) => {
                assert_eq!(path, "host[0].ipv4.mac");
                assert_eq!(directive, Directive::is(Rule::Mac));
                assert_eq!(value, "zz");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn negated_empty_rejects_blank_name() {
        let mut network = network();
        network.name.clear();
        assert!(matches!(
            validate(&network, &[]),
            Err(RuleError::Failed { ref path, .. }) if path == "name"
        ));
    }

    #[test]
    fn network_name_is_capped_at_fifteen_chars() {
        let mut network = network();
        network.name = "a".repeat(15);
        assert_eq!(validate(&network, &[]), Ok(()));
        network.name.push('a');
        assert!(validate(&network, &[]).is_err());
    }

    #[test]
    fn ignored_sub_fields_are_skipped() {
        // A server only uses its port; a missing address is fine.
        let server = Server {
            name: "s1".into(),
            ipv4: ipv4("", "", "", "8080"),
            ..Server::default()
        };
        assert_eq!(validate(&server, &[]), Ok(()));

        // Without the ignore-set the same value fails.
        assert!(validate(&server.ipv4, &[]).is_err());
    }

    #[test]
    fn inherited_ignores_compose() {
        let bare = ipv4("", "", "", "");
        assert_eq!(validate(&bare, &["address", "subnet", "mac", "port"]), Ok(()));
        assert!(validate(&bare, &["address", "subnet", "mac"]).is_err());
    }

    #[test]
    fn unparsable_port_is_reported() {
        let server = Server {
            name: "s1".into(),
            ipv4: ipv4("", "", "", "http"),
            ..Server::default()
        };
        assert!(matches!(validate(&server, &[]), Err(RuleError::Unparsable { .. })));
    }
}
