// ACL rule dialects
// Both dialects share an HCL subset (and an equivalent JSON form). Legacy resource
// blocks always match by prefix; the current dialect tells exact blocks (`key "a"`)
// apart from prefix blocks (`key_prefix "a"`).

use std::fmt::Write as _;

use serde_json::Value;

use crate::model::Syntax;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("line {line}: {message} near {fragment:?}")]
    Syntax {
        line: usize,
        fragment: String,
        message: String,
    },

    #[error("{message}: {fragment:?}")]
    Invalid { fragment: String, message: String },

    #[error("invalid JSON rules: {0}")]
    Json(String),
}

impl RuleError {
    fn invalid(fragment: impl Into<String>, message: &str) -> Self {
        RuleError::Invalid {
            fragment: fragment.into(),
            message: message.to_string(),
        }
    }
}

/// Resource types a rule block can address
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Agent,
    Event,
    Key,
    Node,
    Query,
    Service,
    Session,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::Agent,
        ResourceKind::Event,
        ResourceKind::Key,
        ResourceKind::Node,
        ResourceKind::Query,
        ResourceKind::Service,
        ResourceKind::Session,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Agent => "agent",
            ResourceKind::Event => "event",
            ResourceKind::Key => "key",
            ResourceKind::Node => "node",
            ResourceKind::Query => "query",
            ResourceKind::Service => "service",
            ResourceKind::Session => "session",
        }
    }

    /// Split a block name into its resource kind and whether it is a `_prefix` block
    fn from_block(name: &str) -> Option<(ResourceKind, bool)> {
        let (base, prefix) = match name.strip_suffix("_prefix") {
            Some(base) => (base, true),
            None => (name, false),
        };
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == base)
            .map(|kind| (kind, prefix))
    }
}

/// Access level granted by a rule
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessLevel {
    Read,
    Write,
    Deny,
    List,
}

impl AccessLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessLevel::Read => "read",
            AccessLevel::Write => "write",
            AccessLevel::Deny => "deny",
            AccessLevel::List => "list",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "read" => Some(AccessLevel::Read),
            "write" => Some(AccessLevel::Write),
            "deny" => Some(AccessLevel::Deny),
            "list" => Some(AccessLevel::List),
            _ => None,
        }
    }
}

/// Single resource rule
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceRule {
    pub kind: ResourceKind,
    pub segment: String,
    pub prefix: bool,
    pub policy: AccessLevel,
    pub intentions: Option<AccessLevel>,
}

/// Structured form of a rule document
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicyRules {
    pub resources: Vec<ResourceRule>,
    pub acl: Option<AccessLevel>,
    pub keyring: Option<AccessLevel>,
    pub operator: Option<AccessLevel>,
}

impl PolicyRules {
    /// Parse rule text written in the given dialect. Input starting with `{` is read as JSON.
    pub fn parse(text: &str, syntax: Syntax) -> Result<Self, RuleError> {
        let trimmed = text.trim_start();
        if trimmed.starts_with('{') {
            Self::from_json(trimmed, syntax)
        } else {
            Parser::new(lex(text)?, syntax).parse()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
            && self.acl.is_none()
            && self.keyring.is_none()
            && self.operator.is_none()
    }

    /// Render in the current dialect
    pub fn to_hcl(&self) -> String {
        let mut out = String::new();
        for rule in &self.resources {
            let block = if rule.prefix {
                format!("{}_prefix", rule.kind.as_str())
            } else {
                rule.kind.as_str().to_string()
            };
            let _ = writeln!(out, "{} {} {{", block, quote(&rule.segment));
            let _ = writeln!(out, "  policy = \"{}\"", rule.policy.as_str());
            if let Some(intentions) = rule.intentions {
                let _ = writeln!(out, "  intentions = \"{}\"", intentions.as_str());
            }
            out.push_str("}\n");
        }
        for (name, level) in [
            ("acl", self.acl),
            ("keyring", self.keyring),
            ("operator", self.operator),
        ] {
            if let Some(level) = level {
                let _ = writeln!(out, "{} = \"{}\"", name, level.as_str());
            }
        }
        out
    }

    fn from_json(text: &str, syntax: Syntax) -> Result<Self, RuleError> {
        let value: Value = serde_json::from_str(text).map_err(|e| RuleError::Json(e.to_string()))?;
        let Value::Object(document) = value else {
            return Err(RuleError::Json("top level must be an object".to_string()));
        };

        let mut rules = PolicyRules::default();
        for (name, body) in &document {
            match body {
                Value::String(level) => rules.set_top_level(name, level)?,
                Value::Object(segments) => {
                    for (segment, attrs) in segments {
                        let Value::Object(attrs) = attrs else {
                            return Err(RuleError::invalid(
                                format!("{} {}", name, quote(segment)),
                                "rule body must be an object",
                            ));
                        };
                        let attrs = attrs
                            .iter()
                            .map(|(key, value)| match value {
                                Value::String(s) => Ok((key.clone(), s.clone())),
                                _ => Err(RuleError::invalid(
                                    key.clone(),
                                    "attribute value must be a string",
                                )),
                            })
                            .collect::<Result<Vec<_>, _>>()?;
                        rules.add_resource(name, segment, attrs, syntax)?;
                    }
                }
                _ => return Err(RuleError::invalid(name.clone(), "unsupported rule value")),
            }
        }
        Ok(rules)
    }

    fn set_top_level(&mut self, name: &str, value: &str) -> Result<(), RuleError> {
        let slot = match name {
            "acl" => &mut self.acl,
            "keyring" => &mut self.keyring,
            "operator" => &mut self.operator,
            _ => return Err(RuleError::invalid(name, "unknown top-level attribute")),
        };
        if slot.is_some() {
            return Err(RuleError::invalid(name, "duplicate top-level attribute"));
        }
        *slot = Some(parse_level(value, false)?);
        Ok(())
    }

    fn add_resource(
        &mut self,
        block: &str,
        segment: &str,
        attrs: Vec<(String, String)>,
        syntax: Syntax,
    ) -> Result<(), RuleError> {
        let fragment = || format!("{} {}", block, quote(segment));

        let (kind, prefix) = ResourceKind::from_block(block)
            .ok_or_else(|| RuleError::invalid(block, "unknown rule type"))?;
        if prefix && syntax == Syntax::Legacy {
            return Err(RuleError::invalid(
                fragment(),
                "prefix rules are not valid in the legacy dialect",
            ));
        }

        let mut policy = None;
        let mut intentions = None;
        for (key, value) in attrs {
            match key.as_str() {
                "policy" if policy.is_none() => {
                    policy = Some(parse_level(&value, kind == ResourceKind::Key)?);
                }
                "intentions" if kind == ResourceKind::Service && intentions.is_none() => {
                    intentions = Some(parse_level(&value, false)?);
                }
                "policy" | "intentions" => {
                    return Err(RuleError::invalid(
                        format!("{} {}", fragment(), key),
                        "duplicate or misplaced attribute",
                    ));
                }
                _ => return Err(RuleError::invalid(key, "unknown rule attribute")),
            }
        }
        let policy =
            policy.ok_or_else(|| RuleError::invalid(fragment(), "rule is missing a policy"))?;

        self.resources.push(ResourceRule {
            kind,
            segment: segment.to_string(),
            // every legacy rule is a prefix match
            prefix: prefix || syntax == Syntax::Legacy,
            policy,
            intentions,
        });
        Ok(())
    }
}

/// Translate legacy rule text into an equivalent current-dialect document
pub fn translate_legacy_rules(text: &str) -> Result<String, RuleError> {
    PolicyRules::parse(text, Syntax::Legacy).map(|rules| rules.to_hcl())
}

/// `list` is only meaningful on key rules, in either dialect
fn parse_level(value: &str, allow_list: bool) -> Result<AccessLevel, RuleError> {
    match AccessLevel::parse(value) {
        Some(AccessLevel::List) if !allow_list => {
            Err(RuleError::invalid(value, "access level not permitted here"))
        }
        Some(level) => Ok(level),
        None => Err(RuleError::invalid(value, "invalid access level")),
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

// ============================================================================
// HCL subset lexer and parser
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
enum Tok {
    Ident(String),
    Str(String),
    LBrace,
    RBrace,
    Assign,
}

impl Tok {
    fn fragment(&self) -> String {
        match self {
            Tok::Ident(s) => s.clone(),
            Tok::Str(s) => quote(s),
            Tok::LBrace => "{".to_string(),
            Tok::RBrace => "}".to_string(),
            Tok::Assign => "=".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
struct Lexed {
    tok: Tok,
    line: usize,
}

fn syntax_error(line: usize, fragment: impl Into<String>, message: &str) -> RuleError {
    RuleError::Syntax {
        line,
        fragment: fragment.into(),
        message: message.to_string(),
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn lex(text: &str) -> Result<Vec<Lexed>, RuleError> {
    let mut out = Vec::new();
    let mut chars = text.chars().peekable();
    let mut line = 1;

    while let Some(c) = chars.next() {
        match c {
            '\n' => line += 1,
            c if c.is_whitespace() => {}
            ',' => {}
            '#' => {
                while chars.next_if(|c| *c != '\n').is_some() {}
            }
            '/' if chars.peek() == Some(&'/') => {
                while chars.next_if(|c| *c != '\n').is_some() {}
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let start = line;
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '\n' => line += 1,
                        '*' if chars.peek() == Some(&'/') => {
                            chars.next();
                            closed = true;
                            break;
                        }
                        _ => {}
                    }
                }
                if !closed {
                    return Err(syntax_error(start, "/*", "unterminated comment"));
                }
            }
            '{' => out.push(Lexed {
                tok: Tok::LBrace,
                line,
            }),
            '}' => out.push(Lexed {
                tok: Tok::RBrace,
                line,
            }),
            '=' => out.push(Lexed {
                tok: Tok::Assign,
                line,
            }),
            '"' => {
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => value.push('\n'),
                            Some('t') => value.push('\t'),
                            Some(escaped) => value.push(escaped),
                            None => {
                                return Err(syntax_error(line, value, "unterminated string"));
                            }
                        },
                        Some('\n') | None => {
                            return Err(syntax_error(line, value, "unterminated string"));
                        }
                        Some(c) => value.push(c),
                    }
                }
                out.push(Lexed {
                    tok: Tok::Str(value),
                    line,
                });
            }
            c if is_ident_char(c) => {
                let mut ident = c.to_string();
                while let Some(c) = chars.next_if(|c| is_ident_char(*c)) {
                    ident.push(c);
                }
                out.push(Lexed {
                    tok: Tok::Ident(ident),
                    line,
                });
            }
            other => return Err(syntax_error(line, other, "unexpected character")),
        }
    }
    Ok(out)
}

struct Parser {
    tokens: std::vec::IntoIter<Lexed>,
    syntax: Syntax,
    last_line: usize,
}

impl Parser {
    fn new(tokens: Vec<Lexed>, syntax: Syntax) -> Self {
        Self {
            tokens: tokens.into_iter(),
            syntax,
            last_line: 1,
        }
    }

    fn next(&mut self) -> Option<Lexed> {
        let lexed = self.tokens.next()?;
        self.last_line = lexed.line;
        Some(lexed)
    }

    fn expect_string(&mut self, after: &str) -> Result<String, RuleError> {
        match self.next() {
            Some(Lexed {
                tok: Tok::Str(value),
                ..
            }) => Ok(value),
            Some(other) => Err(syntax_error(
                other.line,
                other.tok.fragment(),
                "expected a quoted string",
            )),
            None => Err(syntax_error(self.last_line, after, "unexpected end of rules")),
        }
    }

    fn parse(mut self) -> Result<PolicyRules, RuleError> {
        let mut rules = PolicyRules::default();

        while let Some(lexed) = self.next() {
            let name = match lexed.tok {
                Tok::Ident(name) => name,
                other => {
                    return Err(syntax_error(lexed.line, other.fragment(), "expected a rule type"));
                }
            };

            match self.next() {
                Some(Lexed {
                    tok: Tok::Assign, ..
                }) => {
                    let value = self.expect_string(&name)?;
                    rules.set_top_level(&name, &value)?;
                }
                Some(Lexed {
                    tok: Tok::Str(segment),
                    ..
                }) => {
                    match self.next() {
                        Some(Lexed {
                            tok: Tok::LBrace, ..
                        }) => {}
                        Some(other) => {
                            return Err(syntax_error(
                                other.line,
                                other.tok.fragment(),
                                "expected '{'",
                            ));
                        }
                        None => {
                            return Err(syntax_error(
                                self.last_line,
                                name,
                                "unexpected end of rules",
                            ));
                        }
                    }
                    let attrs = self.parse_attrs(&name)?;
                    rules.add_resource(&name, &segment, attrs, self.syntax)?;
                }
                Some(other) => {
                    return Err(syntax_error(
                        other.line,
                        other.tok.fragment(),
                        "expected a segment string or '='",
                    ));
                }
                None => return Err(syntax_error(lexed.line, name, "unexpected end of rules")),
            }
        }

        Ok(rules)
    }

    fn parse_attrs(&mut self, block: &str) -> Result<Vec<(String, String)>, RuleError> {
        let mut attrs = Vec::new();
        loop {
            match self.next() {
                Some(Lexed {
                    tok: Tok::RBrace, ..
                }) => return Ok(attrs),
                Some(Lexed {
                    tok: Tok::Ident(key),
                    line,
                }) => {
                    match self.next() {
                        Some(Lexed {
                            tok: Tok::Assign, ..
                        }) => {}
                        Some(other) => {
                            return Err(syntax_error(
                                other.line,
                                other.tok.fragment(),
                                "expected '='",
                            ));
                        }
                        None => return Err(syntax_error(line, key, "unexpected end of rules")),
                    }
                    let value = self.expect_string(&key)?;
                    attrs.push((key, value));
                }
                Some(other) => {
                    return Err(syntax_error(
                        other.line,
                        other.tok.fragment(),
                        "expected an attribute or '}'",
                    ));
                }
                None => return Err(syntax_error(self.last_line, block, "unterminated block")),
            }
        }
    }
}
